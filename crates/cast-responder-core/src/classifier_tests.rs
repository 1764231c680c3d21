//! Tests for event classification.

use super::*;
use crate::event::{CastAuthor, MentionedProfile, CAST_CREATED};
use crate::CastHash;

fn bot() -> BotIdentity {
    BotIdentity::new("mienfoo.eth", Fid::new(191))
}

fn classifier() -> EventClassifier {
    EventClassifier::new(bot(), Arc::new(DeduplicationCache::default()))
}

fn cast(hash: &str, text: &str) -> CastEvent {
    CastEvent {
        hash: CastHash::new(hash).unwrap(),
        text: text.to_string(),
        author: CastAuthor {
            fid: Some(Fid::new(234506)),
            username: "alice".to_string(),
            display_name: Some("Alice".to_string()),
        },
        mentioned_profiles: Vec::new(),
    }
}

fn cast_created(cast: CastEvent) -> WebhookEvent {
    WebhookEvent {
        kind: CAST_CREATED.to_string(),
        cast: Some(cast),
    }
}

// ============================================================================
// BotIdentity
// ============================================================================

mod bot_identity_tests {
    use super::*;

    #[test]
    fn test_leading_at_sign_stripped_from_username() {
        let bot = BotIdentity::new(" @mienfoo.eth", Fid::new(191));
        assert_eq!(bot.username, "mienfoo.eth");
        assert_eq!(bot.handle(), "@mienfoo.eth");
    }

    #[test]
    fn test_text_mention_is_case_insensitive() {
        assert!(bot().is_mentioned_in(&cast("0x1", "hey @MienFoo.ETH, thoughts?")));
    }

    #[test]
    fn test_bare_username_without_at_sign_is_not_a_mention() {
        assert!(!bot().is_mentioned_in(&cast("0x1", "mienfoo.eth is great")));
    }

    #[test]
    fn test_mention_by_listed_fid() {
        let mut event = cast("0x1", "no handle in text");
        event.mentioned_profiles.push(MentionedProfile {
            username: None,
            fid: Some(Fid::new(191)),
        });
        assert!(bot().is_mentioned_in(&event));
    }

    #[test]
    fn test_mention_by_listed_username() {
        let mut event = cast("0x1", "no handle in text");
        event.mentioned_profiles.push(MentionedProfile {
            username: Some("Mienfoo.eth".to_string()),
            fid: None,
        });
        assert!(bot().is_mentioned_in(&event));
    }

    #[test]
    fn test_other_listed_profiles_do_not_match() {
        let mut event = cast("0x1", "hi @bob");
        event.mentioned_profiles.push(MentionedProfile {
            username: Some("bob".to_string()),
            fid: Some(Fid::new(2)),
        });
        assert!(!bot().is_mentioned_in(&event));
    }

    #[test]
    fn test_longer_handle_is_not_a_mention() {
        assert!(!bot().is_mentioned_in(&cast("0x1", "ask @mienfoo.ethereum instead")));
        assert!(!bot().is_mentioned_in(&cast("0x1", "mail me@mienfoo.eth")));
        assert!(!bot().is_mentioned_in(&cast("0x1", "@mienfoo.eth_fan club")));
    }

    #[test]
    fn test_mention_followed_by_punctuation() {
        assert!(bot().is_mentioned_in(&cast("0x1", "thanks @mienfoo.eth.")));
        assert!(bot().is_mentioned_in(&cast("0x1", "(@mienfoo.eth), thoughts?")));
    }

    #[test]
    fn test_strip_mention_keeps_inner_whitespace() {
        let stripped = bot().strip_mention("  @MIENFOO.eth   what is   a cast? @mienfoo.eth ");
        assert_eq!(stripped, "what is   a cast?");
    }

    #[test]
    fn test_strip_mention_leaves_longer_handles() {
        let stripped = bot().strip_mention("@mienfoo.eth ask @mienfoo.ethereum");
        assert_eq!(stripped, "ask @mienfoo.ethereum");
    }

    #[test]
    fn test_strip_mention_preserves_non_ascii_text() {
        let stripped = bot().strip_mention("@mienfoo.eth ¿qué tal? ünïcødé");
        assert_eq!(stripped, "¿qué tal? ünïcødé");
    }
}

// ============================================================================
// IgnoreReason
// ============================================================================

#[test]
fn test_ignore_reasons_serialize_kebab_case() {
    let reasons = [
        (IgnoreReason::WrongEventType, "\"wrong-event-type\""),
        (IgnoreReason::Duplicate, "\"duplicate\""),
        (IgnoreReason::NotMentioned, "\"not-mentioned\""),
    ];

    for (reason, expected) in reasons {
        assert_eq!(serde_json::to_string(&reason).unwrap(), expected);
        assert_eq!(format!("\"{}\"", reason), expected);
    }
}

// ============================================================================
// EventClassifier
// ============================================================================

mod classify_tests {
    use super::*;

    #[test]
    fn test_mentioning_cast_is_actionable() {
        let event = cast("0x1", "gm @mienfoo.eth");
        let result = classifier().classify(cast_created(event.clone()));

        assert_eq!(result, Classification::Actionable(event));
    }

    #[test]
    fn test_other_event_type_ignored() {
        let event = WebhookEvent {
            kind: "follow.created".to_string(),
            cast: None,
        };
        assert_eq!(
            classifier().classify(event),
            Classification::Ignored(IgnoreReason::WrongEventType)
        );
    }

    #[test]
    fn test_wrong_type_does_not_mark_as_seen() {
        let dedup = Arc::new(DeduplicationCache::default());
        let classifier = EventClassifier::new(bot(), Arc::clone(&dedup));

        let event = WebhookEvent {
            kind: "cast.deleted".to_string(),
            cast: Some(cast("0x1", "@mienfoo.eth")),
        };
        classifier.classify(event);

        assert!(!dedup.contains("0x1"));
    }

    #[test]
    fn test_second_delivery_is_duplicate() {
        let classifier = classifier();
        let event = cast("0x1", "gm @mienfoo.eth");

        assert!(matches!(
            classifier.classify(cast_created(event.clone())),
            Classification::Actionable(_)
        ));
        assert_eq!(
            classifier.classify(cast_created(event)),
            Classification::Ignored(IgnoreReason::Duplicate)
        );
    }

    #[test]
    fn test_duplicate_checked_before_mention() {
        let classifier = classifier();
        let event = cast("0x1", "no mention here");

        assert_eq!(
            classifier.classify(cast_created(event.clone())),
            Classification::Ignored(IgnoreReason::NotMentioned)
        );
        // Even an unmentioned cast is remembered, so a redelivery is a duplicate
        assert_eq!(
            classifier.classify(cast_created(event)),
            Classification::Ignored(IgnoreReason::Duplicate)
        );
    }

    #[test]
    fn test_cast_by_bot_mentioning_itself_is_actionable() {
        let mut event = cast("0x1", "replying to @mienfoo.eth myself");
        event.author.fid = Some(Fid::new(191));
        event.author.username = "mienfoo.eth".to_string();

        assert_eq!(
            classifier().classify(cast_created(event.clone())),
            Classification::Actionable(event)
        );
    }

    #[test]
    fn test_unmentioned_cast_ignored() {
        assert_eq!(
            classifier().classify(cast_created(cast("0x1", "just a regular cast"))),
            Classification::Ignored(IgnoreReason::NotMentioned)
        );
    }
}
