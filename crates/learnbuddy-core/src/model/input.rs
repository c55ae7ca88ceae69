//! Normalization of user-entered values before they reach the tree.

use crate::error::ValidationError;

/// Trim a task or subtask description, rejecting blank input.
pub fn normalize_description(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankDescription);
    }
    Ok(trimmed.to_owned())
}

/// Trim a learning goal, rejecting blank input.
pub fn normalize_learning_goal(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankLearningGoal);
    }
    Ok(trimmed.to_owned())
}

/// Parse story points typed by a user.
///
/// Accepts a non-negative whole number. An empty field means 0. Anything
/// else (negative, fractional, non-numeric) is rejected.
pub fn parse_story_points(raw: &str) -> Result<u32, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    let value: i64 = trimmed
        .parse()
        .map_err(|_| ValidationError::InvalidStoryPoints(raw.to_owned()))?;
    validate_story_points(value)
}

/// Check a numeric story point value.
pub fn validate_story_points(points: i64) -> Result<u32, ValidationError> {
    u32::try_from(points).map_err(|_| ValidationError::InvalidStoryPoints(points.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_is_trimmed() {
        assert_eq!(normalize_description("  Learn recursion \n").unwrap(), "Learn recursion");
    }

    #[test]
    fn blank_description_is_rejected() {
        assert_eq!(normalize_description(""), Err(ValidationError::BlankDescription));
        assert_eq!(normalize_description(" \t "), Err(ValidationError::BlankDescription));
    }

    #[test]
    fn blank_goal_is_rejected() {
        assert_eq!(normalize_learning_goal("   "), Err(ValidationError::BlankLearningGoal));
        assert_eq!(normalize_learning_goal(" Learn Go ").unwrap(), "Learn Go");
    }

    #[test]
    fn story_points_parse() {
        assert_eq!(parse_story_points("5"), Ok(5));
        assert_eq!(parse_story_points(" 13 "), Ok(13));
        assert_eq!(parse_story_points(""), Ok(0));
        assert_eq!(parse_story_points("0"), Ok(0));
    }

    #[test]
    fn bad_story_points_are_rejected() {
        for raw in ["-1", "2.5", "three", "1e3"] {
            assert!(
                matches!(parse_story_points(raw), Err(ValidationError::InvalidStoryPoints(_))),
                "{raw} should be rejected"
            );
        }
        assert!(validate_story_points(-1).is_err());
        assert_eq!(validate_story_points(21), Ok(21));
    }
}
