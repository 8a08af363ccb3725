use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::queries;
use crate::models::task::{ChordSlot, TaskEnvelope, TaskStep};
use crate::services::queue::QueueError;

/// How often the aggregator re-checks the chord result hash.
const COLLECT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Generation prompt shared by every catalog fan-out chain.
const FANOUT_GENERATION_PROMPT: &str =
    "Generate a realistic, high-quality full-body image of the input person \
     wearing the input clothing. Ensure the clothes fit naturally to the body \
     shape and preserve the person's facial features, skin tone, and hair. \
     Frontal studio shot.";

/// Background prompt applied to every catalog fan-out chain's edit step.
const FANOUT_EDIT_PROMPT: &str =
    "Replace the background with a clean white studio backdrop, \
     keeping the person and clothing unchanged.";

/// Build the four prompt variations of the interactive one-shot workflow
/// from the garment metadata.
pub fn build_prompt_variants(category: &str, detail: &str, fit: &str, length: &str) -> Vec<String> {
    let garment_clause = match category {
        "top" => {
            "Replace only the upper garment with the input clothing, \
             leaving all other clothes unchanged."
        }
        "bottom" => {
            "Replace only the lower garment with the input clothing, \
             leaving all other clothes unchanged."
        }
        _ => "Replace the input clothing as requested.",
    };

    let base_prompt = format!(
        "Generate a realistic, high-quality full-body image of the input person \
         wearing the input clothing. {garment_clause} Ensure the clothes fit \
         naturally to the body shape and preserve the person's facial features, \
         skin tone, and hair. \
         (Category: {category}, Detail: {detail}, Fit: {fit}, Length: {length}) "
    );

    [
        "Frontal studio shot.",
        "45-degree left angle view.",
        "45-degree right angle view.",
        "Back view showcasing garment fit.",
    ]
    .iter()
    .map(|angle| format!("{base_prompt}{angle}"))
    .collect()
}

/// Submit K parallel generation variants sharing the same two input images.
/// Each variant is a single-step chain whose terminal output lands in the
/// chord result hash at its submission index.
pub async fn submit_chord(
    state: &AppState,
    user_id: Uuid,
    person_image_id: &str,
    outfit_image_id: &str,
    prompts: &[String],
) -> Result<Uuid, WorkflowError> {
    let chord_id = Uuid::new_v4();

    for (index, prompt) in prompts.iter().enumerate() {
        let envelope = TaskEnvelope::new(
            user_id,
            TaskStep::GenerateById {
                person_image_id: person_image_id.to_string(),
                outfit_image_id: outfit_image_id.to_string(),
                prompt: prompt.clone(),
            },
            vec![],
        )
        .with_chord(ChordSlot {
            chord_id,
            index: index as u32,
        });

        state.queue.enqueue(&envelope).await?;
    }

    tracing::info!(
        chord_id = %chord_id,
        user_id = %user_id,
        variants = prompts.len(),
        "chord submitted"
    );
    Ok(chord_id)
}

/// Block until all `expected` chord members have reported, up to `timeout`.
/// Returns the outputs ordered by submission index; timing out is a surfaced
/// error, never silently partial data.
pub async fn collect(
    state: &AppState,
    chord_id: Uuid,
    expected: usize,
    timeout: Duration,
) -> Result<Vec<Option<String>>, WorkflowError> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let reported = state.queue.chord_size(chord_id).await?;
        if reported as usize >= expected {
            let results = state.queue.read_chord_results(chord_id).await?;
            return Ok(assemble_results(&results, expected));
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!(
                chord_id = %chord_id,
                reported,
                expected,
                "chord aggregation timed out"
            );
            return Err(WorkflowError::AggregationTimeout);
        }
        sleep(COLLECT_POLL_INTERVAL).await;
    }
}

/// Order chord outputs by submission index. A missing slot (which only a
/// dropped worker could produce) reads as the failure sentinel.
fn assemble_results(results: &HashMap<u32, Option<String>>, expected: usize) -> Vec<Option<String>> {
    (0..expected as u32)
        .map(|index| results.get(&index).cloned().flatten())
        .collect()
}

/// Positions of the failure sentinel in a collected list.
pub fn failed_indices(results: &[Option<String>]) -> Vec<usize> {
    results
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.is_none().then_some(i))
        .collect()
}

/// Submit one generate → edit → persist chain per live catalog product,
/// fire-and-forget. The per-user guard flag is claimed atomically first;
/// a concurrent fan-out for the same user is rejected with zero tasks
/// enqueued. Returns the group handle and chain count.
pub async fn submit_catalog_fanout(
    state: &AppState,
    user_id: Uuid,
) -> Result<(Uuid, usize), WorkflowError> {
    if !queries::try_begin_fitting(&state.db, user_id).await? {
        return Err(WorkflowError::AlreadyInProgress);
    }

    // Past this point the flag is ours; release it on every early exit.
    let person_url = match queries::latest_user_image(&state.db, user_id).await? {
        Some(url) => url,
        None => {
            queries::clear_fitting_flag(&state.db, user_id).await?;
            return Err(WorkflowError::MissingSourceImage);
        }
    };

    let products = queries::list_active_products(&state.db).await?;
    if products.is_empty() {
        queries::clear_fitting_flag(&state.db, user_id).await?;
        let group_id = Uuid::new_v4();
        return Ok((group_id, 0));
    }

    let group_id = Uuid::new_v4();
    state.queue.init_group(group_id, products.len()).await?;

    let mut submitted = 0usize;
    for product in &products {
        let envelope = TaskEnvelope::new(
            user_id,
            TaskStep::GenerateByUrl {
                person_url: person_url.clone(),
                outfit_url: product.image_url.clone(),
                prompt: FANOUT_GENERATION_PROMPT.to_string(),
            },
            vec![
                TaskStep::EditBackground {
                    prompt: FANOUT_EDIT_PROMPT.to_string(),
                },
                TaskStep::Persist {
                    product_id: product.id,
                },
            ],
        )
        .with_group(group_id);

        if let Err(e) = state.queue.enqueue(&envelope).await {
            // Count the unsubmitted chain off the group so the guard flag
            // still clears when the submitted chains finish.
            tracing::error!(
                group_id = %group_id,
                product_id = product.id,
                error = %e,
                "failed to enqueue fan-out chain"
            );
            state.queue.finish_group_chain(group_id).await?;
            continue;
        }
        submitted += 1;
    }

    if submitted == 0 {
        queries::clear_fitting_flag(&state.db, user_id).await?;
        return Err(WorkflowError::NothingSubmitted);
    }

    tracing::info!(
        group_id = %group_id,
        user_id = %user_id,
        item_count = products.len(),
        submitted,
        "catalog fan-out submitted"
    );
    Ok((group_id, products.len()))
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("a catalog fan-out is already in progress for this user")]
    AlreadyInProgress,

    #[error("user has no uploaded source photo")]
    MissingSourceImage,

    #[error("chord aggregation timed out")]
    AggregationTimeout,

    #[error("no fan-out chain could be enqueued")]
    NothingSubmitted,

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_four_prompt_variants() {
        let prompts = build_prompt_variants("top", "short sleeve", "regular", "standard");
        assert_eq!(prompts.len(), 4);
        assert!(prompts[0].ends_with("Frontal studio shot."));
        assert!(prompts[3].ends_with("Back view showcasing garment fit."));
        for p in &prompts {
            assert!(p.contains("Replace only the upper garment"));
            assert!(p.contains("Detail: short sleeve"));
        }
    }

    #[test]
    fn test_garment_clause_varies_by_category() {
        let bottom = build_prompt_variants("bottom", "d", "f", "l");
        assert!(bottom[0].contains("Replace only the lower garment"));
        let other = build_prompt_variants("dress", "d", "f", "l");
        assert!(other[0].contains("Replace the input clothing as requested."));
    }

    #[test]
    fn test_assemble_preserves_submission_order() {
        // Completion order scrambled; output order must follow indices.
        let mut reported = HashMap::new();
        reported.insert(2, Some("c".to_string()));
        reported.insert(0, Some("a".to_string()));
        reported.insert(1, Some("b".to_string()));
        assert_eq!(
            assemble_results(&reported, 3),
            vec![
                Some("a".to_string()),
                Some("b".to_string()),
                Some("c".to_string())
            ]
        );
    }

    #[test]
    fn test_assemble_keeps_failure_sentinel_in_place() {
        let mut reported = HashMap::new();
        reported.insert(0, Some("url_a".to_string()));
        reported.insert(1, None);
        let collected = assemble_results(&reported, 2);
        assert_eq!(collected, vec![Some("url_a".to_string()), None]);
        assert_eq!(failed_indices(&collected), vec![1]);
    }

    #[test]
    fn test_missing_slot_reads_as_failure() {
        let mut reported = HashMap::new();
        reported.insert(0, Some("url_a".to_string()));
        let collected = assemble_results(&reported, 2);
        assert_eq!(collected[1], None);
    }

    #[test]
    fn test_failed_indices_empty_on_full_success() {
        let collected = vec![Some("a".to_string()), Some("b".to_string())];
        assert!(failed_indices(&collected).is_empty());
    }
}
