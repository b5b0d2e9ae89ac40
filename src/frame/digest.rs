//! Frame digest: an importance-weighted summary of a frame's own items,
//! computed once at close.

use crate::context::{excerpt, ScoredContext};
use crate::frame::Frame;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

const DIGEST_EXCERPT_CHARS: usize = 160;

#[derive(Debug, Clone, PartialEq)]
pub struct FrameDigest {
    pub text: String,
    pub json: Value,
}

impl FrameDigest {
    /// Build the digest from `ranked` (best first), keeping the top `top_k`.
    pub fn compute(
        frame: &Frame,
        ranked: &[ScoredContext],
        top_k: usize,
        outputs: &Value,
    ) -> Self {
        let item_count = ranked.len();
        let header = format!("Frame '{}' ({})", frame.name, frame.frame_type);

        if ranked.is_empty() {
            return Self {
                text: format!("{header}: no context captured"),
                json: json!({
                    "item_count": 0,
                    "by_type": {},
                    "weighted_score": 0.0,
                    "top": [],
                    "outputs": outputs,
                }),
            };
        }

        let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
        for scored in ranked {
            *by_type.entry(scored.item.context_type.as_str()).or_default() += 1;
        }

        let top = &ranked[..top_k.min(item_count)];
        let mut lines = vec![format!(
            "{header}: {item_count} context item{}",
            if item_count == 1 { "" } else { "s" }
        )];
        lines.extend(top.iter().map(|scored| {
            format!(
                "- [{}] {}",
                scored.item.context_type,
                excerpt(&scored.item.content, DIGEST_EXCERPT_CHARS)
            )
        }));

        let top_json: Vec<Value> = top
            .iter()
            .map(|scored| {
                json!({
                    "id": scored.item.id,
                    "type": scored.item.context_type,
                    "score": scored.score,
                    "excerpt": excerpt(&scored.item.content, DIGEST_EXCERPT_CHARS),
                })
            })
            .collect();

        let by_type: Map<String, Value> = by_type
            .into_iter()
            .map(|(k, v)| (k.to_string(), Value::from(v)))
            .collect();

        Self {
            text: lines.join("\n"),
            json: json!({
                "item_count": item_count,
                "by_type": by_type,
                "weighted_score": weighted_mean(ranked),
                "top": top_json,
                "outputs": outputs,
            }),
        }
    }
}

/// Mean score with each item weighted by its own score.
fn weighted_mean(ranked: &[ScoredContext]) -> f64 {
    let total: f64 = ranked.iter().map(|s| s.score).sum();
    if total <= 0.0 {
        return 0.0;
    }
    ranked.iter().map(|s| s.score * s.score).sum::<f64>() / total
}
