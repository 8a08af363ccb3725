use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One step of a fitting chain. Steps that consume a predecessor's output
/// receive it through [`TaskEnvelope::carried`], not through their own args.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskStep {
    /// Try-on generation from vendor-hosted image ids (interactive chord path).
    GenerateById {
        person_image_id: String,
        outfit_image_id: String,
        prompt: String,
    },
    /// Try-on generation from already-hosted URLs (catalog fan-out path).
    GenerateByUrl {
        person_url: String,
        outfit_url: String,
        prompt: String,
    },
    /// Background replacement of the carried image via the edit endpoint.
    EditBackground { prompt: String },
    /// Download the carried asset, store it, upsert the fitting row.
    Persist { product_id: i64 },
    /// Long poll of a video job accepted earlier by the media vendor.
    VideoPoll { product_id: i64, job_handle: String },
}

/// Position of a chord member's output in the collected list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ChordSlot {
    pub chord_id: Uuid,
    pub index: u32,
}

/// The unit the queue schedules and the worker retries wholesale.
///
/// A chain is represented by the current step plus its planned successors;
/// when a step finishes, the worker enqueues the next envelope with the
/// step's output carried forward. A `None` output is the ran-but-produced-
/// nothing sentinel and flows through the rest of the chain unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskEnvelope {
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub attempt: i32,
    pub step: TaskStep,
    /// Output of the predecessor step, if any.
    pub carried: Option<String>,
    /// Remaining steps of this chain, in execution order.
    pub rest: Vec<TaskStep>,
    /// Set when this chain's terminal output belongs to a chord.
    pub chord: Option<ChordSlot>,
    /// Set when this chain belongs to a fan-out group.
    pub group_id: Option<Uuid>,
}

impl TaskEnvelope {
    pub fn new(user_id: Uuid, step: TaskStep, rest: Vec<TaskStep>) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            user_id,
            attempt: 0,
            step,
            carried: None,
            rest,
            chord: None,
            group_id: None,
        }
    }

    pub fn with_chord(mut self, slot: ChordSlot) -> Self {
        self.chord = Some(slot);
        self
    }

    pub fn with_group(mut self, group_id: Uuid) -> Self {
        self.group_id = Some(group_id);
        self
    }

    /// Build the successor envelope, handing `output` to the next step.
    /// Returns `None` when this step was the chain's terminal.
    pub fn advance(&self, output: Option<String>) -> Option<TaskEnvelope> {
        let mut rest = self.rest.clone();
        if rest.is_empty() {
            return None;
        }
        let step = rest.remove(0);
        Some(TaskEnvelope {
            task_id: Uuid::new_v4(),
            user_id: self.user_id,
            attempt: 0,
            step,
            carried: output,
            rest,
            chord: self.chord,
            group_id: self.group_id,
        })
    }

    /// Same envelope, one more attempt; used for transient-failure re-enqueue.
    pub fn retried(&self) -> TaskEnvelope {
        let mut env = self.clone();
        env.attempt += 1;
        env
    }
}
