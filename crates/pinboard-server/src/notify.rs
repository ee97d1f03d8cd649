//! Notifications raised by board mutations.
//!
//! - cross-list move: every member except the mover gets a status update;
//! - assignment: each newly assigned member other than the assigner gets an
//!   assignment notice;
//! - due date set: every member except the editor gets a status update.

use chrono::{DateTime, Utc};
use pinboard_core::Environment;
use pinboard_proto::{
    NotificationId, UserId,
    payloads::model::{Card, Notification, NotificationKind},
};

/// Notifications for a card that changed lists.
pub fn card_moved<E: Environment>(
    env: &E,
    card: &Card,
    sender: UserId,
    from_title: &str,
    to_title: &str,
) -> Vec<Notification> {
    let message =
        format!("The card \"{}\" was moved from \"{from_title}\" to \"{to_title}\"", card.title);
    others(card, sender)
        .map(|recipient| build(env, card, sender, recipient, NotificationKind::StatusUpdate, &message))
        .collect()
}

/// Notifications for members newly assigned to a card. Members who assigned
/// themselves are skipped.
///
/// `created` selects the wording used when the card itself is new.
pub fn assigned<E: Environment>(
    env: &E,
    card: &Card,
    sender: UserId,
    recipients: &[UserId],
    created: bool,
) -> Vec<Notification> {
    let mut message = if created {
        format!("You were assigned to the new card \"{}\"", card.title)
    } else {
        format!("You were assigned to the card \"{}\"", card.title)
    };
    if let (true, Some(due)) = (created, card.due) {
        message.push_str(&format!(" which is due on {}", day(due)));
    }

    recipients
        .iter()
        .filter(|&&recipient| recipient != sender)
        .map(|&recipient| build(env, card, sender, recipient, NotificationKind::Assignment, &message))
        .collect()
}

/// Notifications for a card whose due date was set.
pub fn due_changed<E: Environment>(env: &E, card: &Card, sender: UserId) -> Vec<Notification> {
    let Some(due) = card.due else {
        return Vec::new();
    };
    let message = format!("The due date for \"{}\" was updated to {}", card.title, day(due));
    others(card, sender)
        .map(|recipient| build(env, card, sender, recipient, NotificationKind::StatusUpdate, &message))
        .collect()
}

fn others(card: &Card, sender: UserId) -> impl Iterator<Item = UserId> + '_ {
    card.members.iter().copied().filter(move |&member| member != sender)
}

fn day(at: DateTime<Utc>) -> String {
    at.date_naive().to_string()
}

fn build<E: Environment>(
    env: &E,
    card: &Card,
    sender: UserId,
    recipient: UserId,
    kind: NotificationKind,
    message: &str,
) -> Notification {
    Notification {
        id: NotificationId::new(env.random_u128()),
        recipient,
        sender,
        kind,
        message: message.to_owned(),
        board_id: card.board_id,
        card_id: card.id,
        is_read: false,
        created_at: env.wall_clock(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use chrono::TimeZone;
    use pinboard_proto::{BoardId, CardId, ListId};

    use super::*;

    #[derive(Clone)]
    struct FixedEnv;

    impl Environment for FixedEnv {
        fn now(&self) -> Instant {
            Instant::now()
        }

        fn wall_clock(&self) -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
        }

        async fn sleep(&self, _duration: Duration) {}

        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(7);
        }
    }

    fn card(members: &[u64], due: Option<DateTime<Utc>>) -> Card {
        Card {
            id: CardId::new(1),
            title: "Launch".into(),
            description: String::new(),
            list_id: ListId::new(2),
            board_id: BoardId::new(3),
            members: members.iter().copied().map(UserId::new).collect(),
            due,
            labels: vec![],
            checklists: vec![],
            comment_count: 0,
        }
    }

    #[test]
    fn move_skips_the_mover() {
        let notes = card_moved(&FixedEnv, &card(&[1, 2, 3], None), UserId::new(2), "Todo", "Done");
        let recipients: Vec<u64> = notes.iter().map(|n| n.recipient.get()).collect();
        assert_eq!(recipients, vec![1, 3]);
        assert_eq!(notes[0].message, "The card \"Launch\" was moved from \"Todo\" to \"Done\"");
    }

    #[test]
    fn new_card_assignment_mentions_due_date() {
        let due = Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap();
        let notes = assigned(&FixedEnv, &card(&[1], Some(due)), UserId::new(9), &[UserId::new(1)], true);
        assert_eq!(notes.len(), 1);
        assert!(notes[0].message.ends_with("which is due on 2024-05-06"));
        assert_eq!(notes[0].kind, NotificationKind::Assignment);
    }

    #[test]
    fn self_assignment_is_silent() {
        let notes = assigned(&FixedEnv, &card(&[1], None), UserId::new(1), &[UserId::new(1)], false);
        assert!(notes.is_empty());
    }

    #[test]
    fn cleared_due_date_notifies_nobody() {
        assert!(due_changed(&FixedEnv, &card(&[1, 2], None), UserId::new(1)).is_empty());
    }
}
