//! Reduction of raw attribute analysis to one category per attribute.

use crate::capability::RawAttributes;
use crate::engine::EngineError;
use crate::types::AttributeEstimate;
use std::collections::HashMap;

/// Reduce `raw` to its arg-max gender and emotion.
pub fn summarize(raw: &RawAttributes) -> Result<AttributeEstimate, EngineError> {
    if !raw.age.is_finite() {
        return Err(EngineError::Analysis(format!(
            "age estimate is not a finite number: {}",
            raw.age
        )));
    }

    let gender = arg_max(&raw.gender)
        .ok_or_else(|| EngineError::Analysis("gender confidences are empty".into()))?;
    let emotion = arg_max(&raw.emotion)
        .ok_or_else(|| EngineError::Analysis("emotion confidences are empty".into()))?;

    Ok(AttributeEstimate {
        age: raw.age,
        gender: gender.to_string(),
        emotion: emotion.to_string(),
    })
}

/// Category with the highest confidence.
///
/// Ties resolve to the lexicographically smallest category so the result does
/// not depend on map iteration order. NaN scores never win.
pub fn arg_max(scores: &HashMap<String, f32>) -> Option<&str> {
    scores
        .iter()
        .filter(|(_, score)| !score.is_nan())
        .fold(None::<(&str, f32)>, |best, (category, &score)| match best {
            Some((best_cat, best_score))
                if best_score > score || (best_score == score && best_cat <= category.as_str()) =>
            {
                Some((best_cat, best_score))
            }
            _ => Some((category.as_str(), score)),
        })
        .map(|(category, _)| category)
}
