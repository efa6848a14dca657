use std::sync::Arc;

use indexmap::IndexMap;
use reflex_core::Settings;
use reflex_middleware::Complete;
use tracing::debug;

use crate::branch::{Branch, Category, Pattern, Predicate};
use crate::nlu::NluCriteria;
use crate::server::ServerCriteria;

type Collection = IndexMap<String, Arc<Branch>>;

/// Branches grouped by category, each group in insertion order.
///
/// Ids are unique within a category; adding a branch under an id already
/// present in that category replaces it. Cloning copies the maps but shares
/// the branches, so a per-run copy can be narrowed with [`forced`] without
/// touching the original.
///
/// [`forced`]: BranchController::forced
#[derive(Debug, Clone, Default)]
pub struct BranchController {
    listen: Collection,
    understand: Collection,
    serve: Collection,
    act: Collection,
    settings: Settings,
}

impl BranchController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Controller whose direct branches read the bot name from `settings`.
    pub fn with_settings(settings: Settings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn collection(&self, category: Category) -> &Collection {
        match category {
            Category::Listen => &self.listen,
            Category::Understand => &self.understand,
            Category::Serve => &self.serve,
            Category::Act => &self.act,
        }
    }

    fn collection_mut(&mut self, category: Category) -> &mut Collection {
        match category {
            Category::Listen => &mut self.listen,
            Category::Understand => &mut self.understand,
            Category::Serve => &mut self.serve,
            Category::Act => &mut self.act,
        }
    }

    /// Insert `branch` under `category`, or its own category when `None`.
    /// Returns the branch id.
    pub fn add(&mut self, mut branch: Branch, category: Option<Category>) -> String {
        if let Some(category) = category {
            branch.category = category;
        }
        let id = branch.id.clone();
        debug!(branch = %id, category = %branch.category, "branch added");
        self.collection_mut(branch.category)
            .insert(id.clone(), Arc::new(branch));
        id
    }

    pub fn remove(&mut self, category: Category, id: &str) -> Option<Arc<Branch>> {
        self.collection_mut(category).shift_remove(id)
    }

    pub fn get(&self, category: Category, id: &str) -> Option<Arc<Branch>> {
        self.collection(category).get(id).cloned()
    }

    /// Drop every non-forced branch in `category`. Returns how many remain.
    pub fn forced(&mut self, category: Category) -> usize {
        let collection = self.collection_mut(category);
        collection.retain(|_, branch| branch.force);
        collection.len()
    }

    /// Whether `category` (or any category, for `None`) holds a branch.
    pub fn exist(&self, category: Option<Category>) -> bool {
        match category {
            Some(category) => !self.collection(category).is_empty(),
            None => Category::ALL
                .iter()
                .any(|c| !self.collection(*c).is_empty()),
        }
    }

    pub fn reset(&mut self) {
        for category in Category::ALL {
            self.collection_mut(category).clear();
        }
    }

    /// Snapshot of `category` in insertion order.
    pub fn branches(&self, category: Category) -> Vec<Arc<Branch>> {
        self.collection(category).values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        Category::ALL.iter().map(|c| self.collection(*c).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        !self.exist(None)
    }

    pub fn text(
        &mut self,
        pattern: impl Into<Pattern>,
        reaction: impl Complete + 'static,
    ) -> String {
        self.add(Branch::text(pattern, reaction), None)
    }

    pub fn direct(
        &mut self,
        pattern: impl Into<Pattern>,
        reaction: impl Complete + 'static,
    ) -> String {
        let branch = Branch::direct(pattern, self.settings.clone(), reaction);
        self.add(branch, None)
    }

    pub fn custom(
        &mut self,
        predicate: impl Predicate + 'static,
        reaction: impl Complete + 'static,
    ) -> String {
        self.add(Branch::custom(predicate, reaction), None)
    }

    pub fn nlu(&mut self, criteria: NluCriteria, reaction: impl Complete + 'static) -> String {
        self.add(Branch::nlu(criteria, reaction), None)
    }

    pub fn direct_nlu(
        &mut self,
        criteria: NluCriteria,
        reaction: impl Complete + 'static,
    ) -> String {
        let branch = Branch::direct_nlu(criteria, self.settings.clone(), reaction);
        self.add(branch, None)
    }

    pub fn custom_nlu(
        &mut self,
        predicate: impl Predicate + 'static,
        reaction: impl Complete + 'static,
    ) -> String {
        self.add(Branch::custom_nlu(predicate, reaction), None)
    }

    pub fn server(
        &mut self,
        criteria: ServerCriteria,
        reaction: impl Complete + 'static,
    ) -> String {
        self.add(Branch::server(criteria, reaction), None)
    }

    pub fn catch_all(&mut self, reaction: impl Complete + 'static) -> String {
        self.add(Branch::catch_all(reaction), None)
    }

    pub fn enter(&mut self, reaction: impl Complete + 'static) -> String {
        self.add(Branch::enter(reaction), None)
    }

    pub fn leave(&mut self, reaction: impl Complete + 'static) -> String {
        self.add(Branch::leave(reaction), None)
    }

    pub fn topic(&mut self, reaction: impl Complete + 'static) -> String {
        self.add(Branch::topic(reaction), None)
    }
}
