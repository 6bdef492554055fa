//! Coarse classification of remaining allowance time for badge surfaces.

/// Urgency bucket for the remaining-time badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Normal,
    Warning,
    Critical,
}

/// What a badge surface should draw for a live allowance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownBadge {
    pub text: String,
    pub tier: Tier,
}

/// Buckets remaining time for display; `None` means clear the badge.
///
/// Under a minute the text is seconds without zero padding ("0:7"), from one
/// to five minutes it is minutes:seconds ("4:09"), and from five minutes up
/// it is whole minutes ("12"). All values floor.
pub fn classify(remaining_ms: u64) -> Option<CountdownBadge> {
    if remaining_ms == 0 {
        return None;
    }

    let total_secs = remaining_ms / 1000;
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;

    Some(if remaining_ms < 60_000 {
        CountdownBadge {
            text: format!("0:{}", seconds),
            tier: Tier::Critical,
        }
    } else if remaining_ms < 300_000 {
        CountdownBadge {
            text: format!("{}:{:02}", minutes, seconds),
            tier: Tier::Warning,
        }
    } else {
        CountdownBadge {
            text: minutes.to_string(),
            tier: Tier::Normal,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn badge(remaining_ms: u64) -> CountdownBadge {
        classify(remaining_ms).unwrap()
    }

    #[test]
    fn test_expired_clears_the_badge() {
        assert_eq!(classify(0), None);
    }

    #[test]
    fn test_critical_under_one_minute() {
        // Seconds are unpadded in the final minute
        assert_eq!(badge(500).text, "0:0");
        assert_eq!(badge(500).tier, Tier::Critical);
        assert_eq!(badge(7_900).text, "0:7");
        assert_eq!(badge(30_000).text, "0:30");
        assert_eq!(badge(59_999).text, "0:59");
        assert_eq!(badge(59_999).tier, Tier::Critical);
    }

    #[test]
    fn test_warning_between_one_and_five_minutes() {
        assert_eq!(badge(60_000).text, "1:00");
        assert_eq!(badge(60_000).tier, Tier::Warning);
        assert_eq!(badge(61_000).text, "1:01");
        assert_eq!(badge(90_000).text, "1:30");
        assert_eq!(badge(249_000).text, "4:09");
        assert_eq!(badge(299_999).text, "4:59");
        assert_eq!(badge(299_999).tier, Tier::Warning);
    }

    #[test]
    fn test_normal_from_five_minutes_up() {
        assert_eq!(badge(300_000).text, "5");
        assert_eq!(badge(300_000).tier, Tier::Normal);
        assert_eq!(badge(359_999).text, "5");
        assert_eq!(badge(720_000).text, "12");
        assert_eq!(badge(3_600_000).text, "60");
    }
}
