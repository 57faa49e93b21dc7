//! The five named task lists and the fan-out helpers that keep them in sync.

use std::fmt;

use taskdesk_proto::identity::TaskId;
use taskdesk_proto::task::Task;

/// One of the independently fetched task lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ListName {
    /// Every task visible to the session.
    AllTasks,
    /// Tasks assigned to the session's user.
    MyTasks,
    /// Tasks the session's user delegated to others.
    DelegatedTasks,
    /// Results of the last search.
    SearchResults,
    /// Results of the last attribute filter.
    FilteredResults,
}

impl ListName {
    /// Every list, in storage order.
    pub const ALL: [Self; 5] = [
        Self::AllTasks,
        Self::MyTasks,
        Self::DelegatedTasks,
        Self::SearchResults,
        Self::FilteredResults,
    ];

    /// Key used for this list in loading and error maps.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllTasks => "allTasks",
            Self::MyTasks => "myTasks",
            Self::DelegatedTasks => "delegatedTasks",
            Self::SearchResults => "searchResults",
            Self::FilteredResults => "filteredResults",
        }
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ListName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The named lists. Each keeps server order; a task may appear in any
/// number of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskLists {
    pub all_tasks: Vec<Task>,
    pub my_tasks: Vec<Task>,
    pub delegated_tasks: Vec<Task>,
    pub search_results: Vec<Task>,
    pub filtered_results: Vec<Task>,
}

impl TaskLists {
    #[must_use]
    pub fn get(&self, name: ListName) -> &[Task] {
        match name {
            ListName::AllTasks => &self.all_tasks,
            ListName::MyTasks => &self.my_tasks,
            ListName::DelegatedTasks => &self.delegated_tasks,
            ListName::SearchResults => &self.search_results,
            ListName::FilteredResults => &self.filtered_results,
        }
    }

    pub fn get_mut(&mut self, name: ListName) -> &mut Vec<Task> {
        match name {
            ListName::AllTasks => &mut self.all_tasks,
            ListName::MyTasks => &mut self.my_tasks,
            ListName::DelegatedTasks => &mut self.delegated_tasks,
            ListName::SearchResults => &mut self.search_results,
            ListName::FilteredResults => &mut self.filtered_results,
        }
    }

    /// Replaces a list wholesale.
    pub fn replace(&mut self, name: ListName, tasks: Vec<Task>) {
        *self.get_mut(name) = tasks;
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (ListName, &mut Vec<Task>)> {
        [
            (ListName::AllTasks, &mut self.all_tasks),
            (ListName::MyTasks, &mut self.my_tasks),
            (ListName::DelegatedTasks, &mut self.delegated_tasks),
            (ListName::SearchResults, &mut self.search_results),
            (ListName::FilteredResults, &mut self.filtered_results),
        ]
        .into_iter()
    }
}

/// Replaces every entry with `task`'s id by a copy of `task`, in place.
/// Returns whether anything matched.
pub(crate) fn replace_matching(list: &mut [Task], task: &Task) -> bool {
    patch_matching(list, &task.id, |entry| entry.clone_from(task))
}

/// Removes every entry with `id`. Returns whether anything was removed.
pub(crate) fn remove_matching(list: &mut Vec<Task>, id: &TaskId) -> bool {
    let before = list.len();
    list.retain(|t| t.id != *id);
    list.len() != before
}

/// Runs `patch` on every entry with `id`. Returns whether anything matched.
pub(crate) fn patch_matching(list: &mut [Task], id: &TaskId, mut patch: impl FnMut(&mut Task)) -> bool {
    let mut matched = false;
    for entry in list.iter_mut().filter(|t| t.id == *id) {
        patch(entry);
        matched = true;
    }
    matched
}
