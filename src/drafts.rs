//! Uncommitted filter edits, held only in process memory.
//!
//! A draft lives between "open editor" and "save"; a process restart discards
//! it, which is an accepted data-loss boundary. Drafts are lazily seeded from
//! the persisted subscriber the first time a chat touches them.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::models::ALL_CATEGORIES;

#[derive(Default)]
pub struct DraftStore {
    categories: Mutex<HashMap<i64, HashSet<String>>>,
    exp_levels: Mutex<HashMap<i64, HashSet<String>>>,
}

impl DraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggles one category in the chat's draft. Picking a concrete category
    /// drops the `all` sentinel first. Returns true if the category was added.
    pub fn toggle_category(&self, chat_id: i64, seed: &[String], category: &str) -> bool {
        let mut drafts = self.categories.lock().expect("drafts mutex poisoned");
        let draft = drafts.entry(chat_id).or_insert_with(|| seed.iter().cloned().collect());
        if category != ALL_CATEGORIES {
            draft.remove(ALL_CATEGORIES);
        }
        if draft.remove(category) {
            false
        } else {
            draft.insert(category.to_string());
            true
        }
    }

    pub fn select_all_categories(&self, chat_id: i64) {
        let mut drafts = self.categories.lock().expect("drafts mutex poisoned");
        let draft = drafts.entry(chat_id).or_default();
        draft.clear();
        draft.insert(ALL_CATEGORIES.to_string());
    }

    pub fn clear_categories(&self, chat_id: i64) {
        let mut drafts = self.categories.lock().expect("drafts mutex poisoned");
        drafts.entry(chat_id).or_default().clear();
    }

    pub fn category_draft(&self, chat_id: i64, seed: &[String]) -> Vec<String> {
        let mut drafts = self.categories.lock().expect("drafts mutex poisoned");
        let draft = drafts.entry(chat_id).or_insert_with(|| seed.iter().cloned().collect());
        sorted(draft)
    }

    /// Commits the draft: returns the final selection and discards the draft.
    pub fn take_categories(&self, chat_id: i64, seed: &[String]) -> Vec<String> {
        let mut drafts = self.categories.lock().expect("drafts mutex poisoned");
        let draft = drafts
            .remove(&chat_id)
            .unwrap_or_else(|| seed.iter().cloned().collect());
        sorted(&draft)
    }

    pub fn toggle_exp_level(&self, chat_id: i64, seed: &[String], level: &str) -> bool {
        let mut drafts = self.exp_levels.lock().expect("drafts mutex poisoned");
        let draft = drafts.entry(chat_id).or_insert_with(|| seed.iter().cloned().collect());
        if draft.remove(level) {
            false
        } else {
            draft.insert(level.to_string());
            true
        }
    }

    pub fn clear_exp_levels(&self, chat_id: i64) {
        let mut drafts = self.exp_levels.lock().expect("drafts mutex poisoned");
        drafts.entry(chat_id).or_default().clear();
    }

    pub fn exp_draft(&self, chat_id: i64, seed: &[String]) -> Vec<String> {
        let mut drafts = self.exp_levels.lock().expect("drafts mutex poisoned");
        let draft = drafts.entry(chat_id).or_insert_with(|| seed.iter().cloned().collect());
        sorted(draft)
    }

    pub fn take_exp_levels(&self, chat_id: i64, seed: &[String]) -> Vec<String> {
        let mut drafts = self.exp_levels.lock().expect("drafts mutex poisoned");
        let draft = drafts
            .remove(&chat_id)
            .unwrap_or_else(|| seed.iter().cloned().collect());
        sorted(&draft)
    }
}

fn sorted(set: &HashSet<String>) -> Vec<String> {
    let mut values: Vec<String> = set.iter().cloned().collect();
    values.sort();
    values
}
