//! Card field updates and checklist sub-documents.
//!
//! Checklists are owned, ordered value records inside a card and are
//! addressed by id. They have no storage of their own: every change here
//! mutates a [`Card`] in memory and the caller persists the whole card
//! through its single write path.

use pinboard_proto::{
    BoardId, CardId, ChecklistId, ChecklistItemId, UserId,
    payloads::{
        model::{Card, Checklist, ChecklistItem},
        requests::{CardPatch, CreateCard, DueUpdate},
    },
};

use crate::error::CardError;

/// Membership and due-date changes caused by a patch.
///
/// The server uses this to keep member task sets in sync and to decide who
/// gets notified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchEffect {
    /// Members newly assigned, in patch order.
    pub added_members: Vec<UserId>,
    /// Members no longer assigned.
    pub removed_members: Vec<UserId>,
    /// Whether the due date was set to a new value. Clearing does not count.
    pub due_changed: bool,
}

/// Build a new card from a creation request.
///
/// Members are deduplicated, keeping first occurrence.
pub fn new_card(id: CardId, board_id: BoardId, request: &CreateCard) -> Result<Card, CardError> {
    let title = non_empty(&request.title).ok_or(CardError::EmptyTitle)?;

    Ok(Card {
        id,
        title: title.to_owned(),
        description: request.description.clone(),
        list_id: request.list_id,
        board_id,
        members: dedup_members(&request.members),
        due: request.due,
        labels: request.labels.clone(),
        checklists: Vec::new(),
        comment_count: 0,
    })
}

/// Apply a field patch in place.
///
/// Validation happens before anything is changed, so on error the card is
/// untouched.
pub fn apply_patch(card: &mut Card, patch: &CardPatch) -> Result<PatchEffect, CardError> {
    let title = match &patch.title {
        Some(title) => Some(non_empty(title).ok_or(CardError::EmptyTitle)?.to_owned()),
        None => None,
    };

    let mut effect = PatchEffect::default();

    if let Some(title) = title {
        card.title = title;
    }
    if let Some(description) = &patch.description {
        card.description.clone_from(description);
    }
    if let Some(members) = &patch.members {
        let members = dedup_members(members);
        effect.added_members =
            members.iter().copied().filter(|m| !card.members.contains(m)).collect();
        effect.removed_members =
            card.members.iter().copied().filter(|m| !members.contains(m)).collect();
        card.members = members;
    }
    match patch.due {
        Some(DueUpdate::Set(due)) => {
            effect.due_changed = card.due != Some(due);
            card.due = Some(due);
        },
        Some(DueUpdate::Clear) => card.due = None,
        None => {},
    }
    if let Some(labels) = &patch.labels {
        card.labels.clone_from(labels);
    }

    Ok(effect)
}

/// Append an empty checklist.
pub fn add_checklist(card: &mut Card, id: ChecklistId, title: &str) -> Result<(), CardError> {
    let title = non_empty(title).ok_or(CardError::EmptyTitle)?;
    card.checklists.push(Checklist { id, title: title.to_owned(), items: Vec::new() });
    Ok(())
}

/// Append an incomplete item to a checklist.
pub fn add_checklist_item(
    card: &mut Card,
    checklist_id: ChecklistId,
    item_id: ChecklistItemId,
    text: &str,
) -> Result<(), CardError> {
    let text = non_empty(text).ok_or(CardError::EmptyText)?.to_owned();
    let checklist = checklist_mut(card, checklist_id)?;
    checklist.items.push(ChecklistItem { id: item_id, text, is_complete: false });
    Ok(())
}

/// Change an item's text and/or completion flag.
///
/// Empty or whitespace-only text leaves the text unchanged.
pub fn update_checklist_item(
    card: &mut Card,
    checklist_id: ChecklistId,
    item_id: ChecklistItemId,
    text: Option<&str>,
    is_complete: Option<bool>,
) -> Result<(), CardError> {
    let checklist = checklist_mut(card, checklist_id)?;
    let item = checklist
        .items
        .iter_mut()
        .find(|item| item.id == item_id)
        .ok_or(CardError::ItemNotFound { checklist_id, item_id })?;

    if let Some(text) = text.and_then(non_empty) {
        text.clone_into(&mut item.text);
    }
    if let Some(done) = is_complete {
        item.is_complete = done;
    }
    Ok(())
}

fn checklist_mut(card: &mut Card, checklist_id: ChecklistId) -> Result<&mut Checklist, CardError> {
    let card_id = card.id;
    card.checklists
        .iter_mut()
        .find(|c| c.id == checklist_id)
        .ok_or(CardError::ChecklistNotFound { card_id, checklist_id })
}

fn non_empty(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn dedup_members(members: &[UserId]) -> Vec<UserId> {
    let mut out = Vec::with_capacity(members.len());
    for &member in members {
        if !out.contains(&member) {
            out.push(member);
        }
    }
    out
}
