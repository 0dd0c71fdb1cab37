// src/aggregate.rs
//! Derives the dashboard view-model from parsed records.
//!
//! [`aggregate`] is a pure function of its inputs: the records, the
//! vocabulary that says which status means "done", and the date treated as
//! today. Calling it twice with the same inputs yields equal view-models.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};

use crate::data_types::{Priority, Record, Vocabulary};

pub const TIMELINE_DAYS: i64 = 30;

/// A record as shown on a board or list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub id: String,
    pub title: String,
    pub category: String,
    pub status: String,
    pub owner: String,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
    pub overdue: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Kpis {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    /// Priority Alta or Urgente, whatever the status.
    pub urgent: usize,
    pub overdue: usize,
    pub due_this_week: usize,
    /// Completed share of the total, in whole percent.
    pub completion_rate: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategorySummary {
    pub total: usize,
    pub status_counts: BTreeMap<String, usize>,
    pub pending: usize,
    pub done: usize,
    pub overdue: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerSummary {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub overdue: usize,
}

/// Weekly executive summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowUp {
    /// Done, with a due date in the last seven days.
    pub completed_week: Vec<Card>,
    pub in_progress: Vec<Card>,
    pub overdue: Vec<Card>,
    /// Not done, due between today and seven days from now.
    pub upcoming: Vec<Card>,
    pub high_priority_pending: Vec<Card>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategorySort {
    #[default]
    MostPending,
    Name,
    MostOverdue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewModel {
    pub today: Option<NaiveDate>,
    pub kpis: Kpis,
    /// Record count per status; only statuses that occur are present.
    pub status_counts: BTreeMap<String, usize>,
    pub categories: BTreeMap<String, CategorySummary>,
    /// Kanban columns keyed by status; every vocabulary status has a column.
    pub board: BTreeMap<String, Vec<Card>>,
    pub overdue: Vec<Card>,
    pub owners: BTreeMap<String, OwnerSummary>,
    pub follow_up: FollowUp,
    /// Record count per priority, every priority present. Records without a
    /// priority are not counted.
    pub priority_counts: Vec<(Priority, usize)>,
    /// Records due on each of the [`TIMELINE_DAYS`] days starting today.
    pub due_by_day: Vec<(NaiveDate, usize)>,
    /// Dated cards grouped by due date, for the calendar.
    pub calendar: BTreeMap<NaiveDate, Vec<Card>>,
    /// Urgent, not done and due today.
    pub urgent_today: Vec<Card>,
}

impl ViewModel {
    pub fn total(&self) -> usize {
        self.kpis.total
    }

    /// Category summaries in display order.
    pub fn categories_sorted(&self, sort: CategorySort) -> Vec<(&str, &CategorySummary)> {
        let mut list: Vec<(&str, &CategorySummary)> = self
            .categories
            .iter()
            .map(|(name, summary)| (name.as_str(), summary))
            .collect();

        // The map is already ordered by name, and the sort is stable.
        match sort {
            CategorySort::Name => {}
            CategorySort::MostPending => list.sort_by(|a, b| b.1.pending.cmp(&a.1.pending)),
            CategorySort::MostOverdue => list.sort_by(|a, b| b.1.overdue.cmp(&a.1.overdue)),
        }
        list
    }
}

pub fn aggregate(records: &[Record], vocabulary: &Vocabulary, today: NaiveDate) -> ViewModel {
    let week_start = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    let week_end = week_start + Duration::days(6);
    let week_ago = today - Duration::days(7);
    let week_ahead = today + Duration::days(7);

    let mut vm = ViewModel {
        today: Some(today),
        ..ViewModel::default()
    };
    for status in &vocabulary.statuses {
        vm.board.insert(status.clone(), Vec::new());
    }
    vm.priority_counts = Priority::ALL.iter().map(|p| (*p, 0)).collect();
    vm.due_by_day = (0..TIMELINE_DAYS)
        .map(|i| (today + Duration::days(i), 0))
        .collect();

    let mut cards: Vec<Card> = records
        .iter()
        .map(|r| Card {
            id: r.id.clone(),
            title: r.title.clone(),
            category: r.category.clone(),
            status: r.status.clone(),
            owner: r.owner.clone(),
            priority: r.priority,
            due_date: r.due_date,
            overdue: r.is_overdue(vocabulary, today),
        })
        .collect();
    // Undated cards go last; ties break on id so output does not depend on input order.
    cards.sort_by(|a, b| {
        (a.due_date.is_none(), a.due_date, &a.id).cmp(&(b.due_date.is_none(), b.due_date, &b.id))
    });

    for card in cards {
        let done = vocabulary.is_done(&card.status);
        let in_progress = card.status == vocabulary.in_progress_status;
        let high = card.priority.is_some_and(|p| p.is_high());

        vm.kpis.total += 1;
        if done {
            vm.kpis.completed += 1;
        }
        if in_progress {
            vm.kpis.in_progress += 1;
        }
        if high {
            vm.kpis.urgent += 1;
        }
        if card.overdue {
            vm.kpis.overdue += 1;
        }
        if card
            .due_date
            .is_some_and(|d| d >= week_start && d <= week_end)
        {
            vm.kpis.due_this_week += 1;
        }

        *vm.status_counts.entry(card.status.clone()).or_default() += 1;

        let category = vm.categories.entry(card.category.clone()).or_default();
        category.total += 1;
        *category.status_counts.entry(card.status.clone()).or_default() += 1;
        if done {
            category.done += 1;
        } else {
            category.pending += 1;
        }
        if card.overdue {
            category.overdue += 1;
        }

        if !card.owner.is_empty() {
            let owner = vm.owners.entry(card.owner.clone()).or_default();
            owner.total += 1;
            if done {
                owner.completed += 1;
            } else {
                owner.pending += 1;
            }
            if card.overdue {
                owner.overdue += 1;
            }
        }

        let follow_up = &mut vm.follow_up;
        if done && card.due_date.is_some_and(|d| d >= week_ago) {
            follow_up.completed_week.push(card.clone());
        }
        if in_progress {
            follow_up.in_progress.push(card.clone());
        }
        if card.overdue {
            follow_up.overdue.push(card.clone());
            vm.overdue.push(card.clone());
        }
        if !done && card.due_date.is_some_and(|d| d >= today && d <= week_ahead) {
            follow_up.upcoming.push(card.clone());
        }
        if !done && high {
            follow_up.high_priority_pending.push(card.clone());
        }

        if let Some(priority) = card.priority {
            if let Some((_, count)) = vm.priority_counts.iter_mut().find(|(p, _)| *p == priority) {
                *count += 1;
            }
        }
        if let Some(due) = card.due_date {
            let offset = (due - today).num_days();
            if (0..TIMELINE_DAYS).contains(&offset) {
                vm.due_by_day[offset as usize].1 += 1;
            }
            if due == today && !done && card.priority == Some(Priority::Urgente) {
                vm.urgent_today.push(card.clone());
            }
            vm.calendar.entry(due).or_default().push(card.clone());
        }

        vm.board.entry(card.status.clone()).or_default().push(card);
    }

    if vm.kpis.total > 0 {
        vm.kpis.completion_rate = (vm.kpis.completed * 100 / vm.kpis.total) as u8;
    }

    vm
}
