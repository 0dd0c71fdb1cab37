// src/data_types.rs
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use once_cell::sync::Lazy;

pub const TASKS_SHEET: &str = "Tasks";
pub const REQUESTS_SHEET: &str = "Requests";
pub const UPDATES_SHEET: &str = "Updates";
pub const CATEGORIES_SHEET: &str = "Categories";

#[derive(Debug, Clone)]
pub enum DataSource {
    Local(PathBuf),
    Cloud(String), // spreadsheet id
}

/// Raw contents of one sheet: the header row and the data rows below it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableData {
    pub fn empty() -> Self {
        TableData {
            headers: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn with_headers<S: AsRef<str>>(headers: &[S]) -> Self {
        TableData {
            headers: headers.iter().map(|h| h.as_ref().to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Baixa,
    Media,
    Alta,
    Urgente,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Baixa,
        Priority::Media,
        Priority::Alta,
        Priority::Urgente,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Baixa => "Baixa",
            Priority::Media => "Média",
            Priority::Alta => "Alta",
            Priority::Urgente => "Urgente",
        }
    }

    pub fn parse(value: &str) -> Option<Priority> {
        let value = value.trim();
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(value))
            .or_else(|| (value.eq_ignore_ascii_case("media")).then_some(Priority::Media))
    }

    pub fn is_high(&self) -> bool {
        matches!(self, Priority::Alta | Priority::Urgente)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryInfo {
    pub key: String,
    pub name: String,
    pub icon: String,
    pub color: String,
    pub bg: String,
}

impl CategoryInfo {
    pub fn named(name: &str) -> Self {
        CategoryInfo {
            key: name.to_string(),
            name: name.to_string(),
            icon: String::new(),
            color: String::new(),
            bg: String::new(),
        }
    }

    fn builtin(icon: &str, name: &str, color: &str, bg: &str) -> Self {
        CategoryInfo {
            key: format!("{icon} {name}"),
            name: name.to_string(),
            icon: icon.to_string(),
            color: color.to_string(),
            bg: bg.to_string(),
        }
    }
}

/// Category list used when the spreadsheet has no Categories sheet.
pub static DEFAULT_CATEGORIES: Lazy<Vec<CategoryInfo>> = Lazy::new(|| {
    vec![
        CategoryInfo::builtin("📚", "Bolsas de Estudos", "#fdab3d", "#5a4a2a"),
        CategoryInfo::builtin("🎓", "Incentivo à Educação (ETEC)", "#e44258", "#4a2a2f"),
        CategoryInfo::builtin("💼", "Programa de Estágio", "#00c875", "#1f4a3c"),
        CategoryInfo::builtin("📊", "Indicadores da Área", "#00d9ff", "#1f3d4a"),
        CategoryInfo::builtin("⚙️", "Projeto de Desenvolvimento", "#579bfc", "#2a3d5a"),
        CategoryInfo::builtin("🤝", "Relacionamento com Instituições", "#a25ddc", "#3d2a5a"),
        CategoryInfo::builtin("🏢", "Deskbee", "#00cd8e", "#1f4a3c"),
        CategoryInfo::builtin("👥", "Pessoas/Atendimentos", "#ff5ac4", "#4a2a4a"),
        CategoryInfo::builtin("📋", "Outros", "#9699a6", "#3d3d4a"),
    ]
});

/// The closed sets a sheet's category and status cells are validated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    pub categories: Vec<CategoryInfo>,
    /// Kanban columns, in display order.
    pub statuses: Vec<String>,
    pub done_status: String,
    pub in_progress_status: String,
}

impl Vocabulary {
    pub fn new<C, S>(categories: &[C], statuses: &[S], done: &str, in_progress: &str) -> Self
    where
        C: AsRef<str>,
        S: AsRef<str>,
    {
        Vocabulary {
            categories: categories
                .iter()
                .map(|c| CategoryInfo::named(c.as_ref()))
                .collect(),
            statuses: statuses.iter().map(|s| s.as_ref().to_string()).collect(),
            done_status: done.to_string(),
            in_progress_status: in_progress.to_string(),
        }
    }

    pub fn tasks() -> Self {
        Vocabulary {
            categories: DEFAULT_CATEGORIES.clone(),
            statuses: ["Pendente", "Em Andamento", "Para Revisão", "Concluído"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            done_status: "Concluído".to_string(),
            in_progress_status: "Em Andamento".to_string(),
        }
    }

    pub fn requests() -> Self {
        Vocabulary::new(
            &["RC", "PO"],
            &["Pendente", "Em Andamento", "Concluído", "Cancelado"],
            "Concluído",
            "Em Andamento",
        )
    }

    /// Resolves a category cell, matching either the key or the display name.
    pub fn category(&self, value: &str) -> Option<&CategoryInfo> {
        let value = value.trim();
        self.categories
            .iter()
            .find(|c| c.name == value || c.key == value)
    }

    pub fn status(&self, value: &str) -> Option<&str> {
        let value = value.trim();
        self.statuses
            .iter()
            .find(|s| s.as_str() == value)
            .map(String::as_str)
    }

    pub fn is_done(&self, status: &str) -> bool {
        self.done_status == status
    }
}

/// One parsed row of a demand, task or RC/PO sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub id: String,
    pub title: String,
    pub category: String,
    pub status: String,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
    pub owner: String,
    /// Free-text columns keyed by column name.
    pub fields: BTreeMap<String, String>,
}

impl Record {
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn is_overdue(&self, vocabulary: &Vocabulary, today: NaiveDate) -> bool {
        !vocabulary.is_done(&self.status) && self.due_date.is_some_and(|due| due < today)
    }
}

/// An entry of a task's follow-up history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskUpdate {
    pub id: String,
    pub task_id: String,
    pub content: String,
    pub timestamp: String,
    pub user: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_accepts_accent_free_spelling() {
        assert_eq!(Priority::parse("Média"), Some(Priority::Media));
        assert_eq!(Priority::parse("media"), Some(Priority::Media));
        assert_eq!(Priority::parse(" urgente "), Some(Priority::Urgente));
        assert_eq!(Priority::parse("Crítica"), None);
    }

    #[test]
    fn category_matches_key_or_name() {
        let vocabulary = Vocabulary::tasks();
        let by_key = vocabulary.category("📚 Bolsas de Estudos").map(|c| c.name.as_str());
        let by_name = vocabulary.category("Bolsas de Estudos").map(|c| c.name.as_str());
        assert_eq!(by_key, Some("Bolsas de Estudos"));
        assert_eq!(by_name, Some("Bolsas de Estudos"));
        assert!(vocabulary.category("Financeiro").is_none());
    }

    #[test]
    fn record_without_due_date_is_never_overdue() {
        let vocabulary = Vocabulary::tasks();
        let today = NaiveDate::from_ymd_opt(2026, 1, 6).unwrap();
        let mut record = Record {
            id: "1".into(),
            status: "Pendente".into(),
            ..Record::default()
        };
        assert!(!record.is_overdue(&vocabulary, today));

        record.due_date = NaiveDate::from_ymd_opt(2026, 1, 5);
        assert!(record.is_overdue(&vocabulary, today));

        record.status = "Concluído".into();
        assert!(!record.is_overdue(&vocabulary, today));
    }
}
