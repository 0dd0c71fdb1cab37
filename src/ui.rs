// src/ui.rs
//! Terminal rendering of a refreshed snapshot. Every function here is a
//! pure view of the view-model; nothing is fetched or mutated.

use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::Datelike;
use clap::ValueEnum;
use colored::{ColoredString, Colorize};
use once_cell::sync::Lazy;

use crate::aggregate::{Card, CategorySort, FollowUp, ViewModel};
use crate::data_types::{Priority, Vocabulary, REQUESTS_SHEET, TASKS_SHEET};
use crate::sync::{SheetView, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Page {
    /// KPI panel
    Painel,
    /// Kanban board
    Quadros,
    /// Per-category view
    Categorias,
    /// Weekly follow-up
    FollowUp,
    /// RC/PO purchase requests
    Requisicoes,
    /// Per-owner summary
    Equipe,
    /// Due dates by day
    Calendario,
    All,
}

#[derive(Debug, Clone, Copy)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Parses `#rrggbb`.
    pub fn from_hex(hex: &str) -> Option<Rgb> {
        let hex = hex.trim().strip_prefix('#')?;
        if hex.len() != 6 {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        Some(Rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

pub struct Styles {
    pub fg: Rgb,
    pub muted: Rgb,
    pub header: Rgb,
    pub ok: Rgb,
    pub danger: Rgb,
    pub accent: Rgb,
}

pub static DARK_THEME: Lazy<Styles> = Lazy::new(|| Styles {
    fg: Rgb(255, 255, 255),
    muted: Rgb(0x96, 0x99, 0xa6),
    header: Rgb(0x57, 0x9b, 0xfc),
    ok: Rgb(0x00, 0xc8, 0x75),
    danger: Rgb(0xe4, 0x42, 0x58),
    accent: Rgb(0xfd, 0xab, 0x3d),
});

static STATUS_COLORS: Lazy<BTreeMap<&'static str, Rgb>> = Lazy::new(|| {
    BTreeMap::from([
        ("Pendente", Rgb(0xc4, 0xc4, 0xc4)),
        ("Em Andamento", Rgb(0xfd, 0xab, 0x3d)),
        ("Para Revisão", Rgb(0x00, 0xc8, 0x75)),
        ("Concluído", Rgb(0x00, 0xca, 0x72)),
        ("Cancelado", Rgb(0x96, 0x99, 0xa6)),
    ])
});

fn paint(text: &str, color: Rgb) -> ColoredString {
    text.truecolor(color.0, color.1, color.2)
}

fn status_color(status: &str) -> Rgb {
    STATUS_COLORS
        .get(status)
        .copied()
        .unwrap_or(DARK_THEME.muted)
}

fn priority_color(priority: Priority) -> Rgb {
    match priority {
        Priority::Baixa => Rgb(0x57, 0x9b, 0xfc),
        Priority::Media => Rgb(0xfd, 0xab, 0x3d),
        Priority::Alta => Rgb(0xe4, 0x42, 0x58),
        Priority::Urgente => Rgb(0xdf, 0x2f, 0x4a),
    }
}

fn title(text: &str) -> ColoredString {
    paint(text, DARK_THEME.header).bold()
}

fn category_label(vocabulary: &Vocabulary, name: &str) -> ColoredString {
    match vocabulary.category(name) {
        Some(info) => {
            let label = if info.icon.is_empty() {
                info.name.clone()
            } else {
                format!("{} {}", info.icon, info.name)
            };
            match Rgb::from_hex(&info.color) {
                Some(color) => paint(&label, color).bold(),
                None => label.bold(),
            }
        }
        None => name.bold(),
    }
}

fn card_line(card: &Card) -> String {
    let mut line = format!("  • {}", paint(&card_title(card), DARK_THEME.fg));
    if let Some(priority) = card.priority {
        let _ = write!(line, " [{}]", paint(priority.as_str(), priority_color(priority)));
    }
    if !card.owner.is_empty() {
        let _ = write!(line, " {}", paint(&format!("@{}", card.owner), DARK_THEME.muted));
    }
    if let Some(due) = card.due_date {
        let due = due.format("%d/%m").to_string();
        let due = if card.overdue {
            paint(&format!("⚠ {due}"), DARK_THEME.danger)
        } else {
            paint(&due, DARK_THEME.muted)
        };
        let _ = write!(line, " {due}");
    }
    line
}

fn card_title(card: &Card) -> String {
    if card.title.is_empty() {
        format!("#{}", card.id)
    } else {
        card.title.clone()
    }
}

pub fn render_kpis(view: &ViewModel) -> String {
    let kpis = &view.kpis;
    let cells = [
        ("📊 TOTAL", kpis.total, DARK_THEME.header),
        ("🎯 CONCLUÍDAS", kpis.completed, DARK_THEME.ok),
        ("⚡ EM ANDAMENTO", kpis.in_progress, DARK_THEME.accent),
        ("🔔 URGENTES", kpis.urgent, DARK_THEME.danger),
        ("⚠️ ATRASADAS", kpis.overdue, DARK_THEME.danger),
        ("📅 ESTA SEMANA", kpis.due_this_week, DARK_THEME.muted),
    ];

    let mut out = format!("{}\n", title("Painel"));
    for (label, value, color) in cells {
        let _ = writeln!(out, "  {:<18}{}", label, paint(&value.to_string(), color).bold());
    }
    let _ = writeln!(out, "  {:<18}{}%", "✅ EFICIÊNCIA", kpis.completion_rate);
    out
}

const BAR_WIDTH: usize = 24;
const SPARKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

fn bar(count: usize, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    "█".repeat((count * BAR_WIDTH).div_ceil(max))
}

/// Priority distribution, the due-date timeline and today's urgent cards.
pub fn render_charts(view: &ViewModel) -> String {
    let mut out = format!("{}\n", title("Por Prioridade"));
    let max = view.priority_counts.iter().map(|(_, n)| *n).max().unwrap_or(0);
    for (priority, count) in &view.priority_counts {
        let _ = writeln!(
            out,
            "  {:<8} {:>3} {}",
            priority.as_str(),
            count,
            paint(&bar(*count, max), priority_color(*priority))
        );
    }

    let _ = writeln!(out, "\n{}", title(&format!("Entregas nos próximos {} dias", view.due_by_day.len())));
    let peak = view.due_by_day.iter().map(|(_, n)| *n).max().unwrap_or(0);
    let line: String = view
        .due_by_day
        .iter()
        .map(|(_, n)| match n {
            0 => '·',
            n => SPARKS[(n * SPARKS.len()).div_ceil(peak.max(1)).clamp(1, SPARKS.len()) - 1],
        })
        .collect();
    let _ = writeln!(out, "  {}", paint(&line, DARK_THEME.accent));
    if let (Some((first, _)), Some((last, _))) = (view.due_by_day.first(), view.due_by_day.last()) {
        let _ = writeln!(
            out,
            "  {} … {} · pico {peak}",
            first.format("%d/%m"),
            last.format("%d/%m")
        );
    }

    card_section(&mut out, "🔥 Urgentes para hoje", &view.urgent_today, "Nada urgente para hoje.");
    out
}

const WEEKDAYS: [&str; 7] = ["seg", "ter", "qua", "qui", "sex", "sáb", "dom"];

/// Dated cards grouped by day, today's marked.
pub fn render_calendar(view: &ViewModel) -> String {
    let mut out = format!("{}\n", title("Calendário"));
    if view.calendar.is_empty() {
        let _ = writeln!(out, "  {}", paint("Nenhuma tarefa com prazo.", DARK_THEME.muted));
    }
    for (day, cards) in &view.calendar {
        let weekday = WEEKDAYS[day.weekday().num_days_from_monday() as usize];
        let heading = format!("{} {weekday} ({})", day.format("%d/%m/%Y"), cards.len());
        let heading = if Some(*day) == view.today {
            paint(&format!("{heading} · hoje"), DARK_THEME.accent).bold()
        } else {
            heading.bold()
        };
        let _ = writeln!(out, "\n{heading}");
        for card in cards {
            let _ = writeln!(out, "{}", card_line(card));
        }
    }
    out
}

pub fn render_board(sheet: &SheetView) -> String {
    let vocabulary = &sheet.schema.vocabulary;
    let mut out = format!("{}\n", title(&format!("Quadro · {}", sheet.schema.sheet)));

    let mut columns: Vec<&str> = vocabulary.statuses.iter().map(String::as_str).collect();
    // Statuses outside the vocabulary can only come from a custom schema; show them last.
    columns.extend(
        sheet
            .view
            .board
            .keys()
            .map(String::as_str)
            .filter(|s| vocabulary.status(s).is_none()),
    );

    for status in columns {
        let cards = sheet.view.board.get(status).map(Vec::as_slice).unwrap_or(&[]);
        let _ = writeln!(
            out,
            "\n{} ({})",
            paint(status, status_color(status)).bold(),
            cards.len()
        );
        if cards.is_empty() {
            let _ = writeln!(out, "  {}", paint("—", DARK_THEME.muted));
        }
        for card in cards {
            let _ = writeln!(out, "{}", card_line(card));
        }
    }
    out
}

pub fn render_categories(sheet: &SheetView, sort: CategorySort) -> String {
    let vocabulary = &sheet.schema.vocabulary;
    let mut out = format!("{}\n", title("Categorias"));

    let pending_total: usize = sheet.view.categories.values().map(|c| c.pending).sum();
    let _ = writeln!(out, "  {} pendentes no total", pending_total);

    for (name, summary) in sheet.view.categories_sorted(sort) {
        let _ = writeln!(
            out,
            "\n{}  {} pendentes · {} concluídas · {}",
            category_label(vocabulary, name),
            summary.pending,
            summary.done,
            if summary.overdue > 0 {
                paint(&format!("{} atrasadas", summary.overdue), DARK_THEME.danger)
            } else {
                paint("0 atrasadas", DARK_THEME.muted)
            }
        );
        for (status, count) in &summary.status_counts {
            let _ = writeln!(out, "    {}: {count}", paint(status, status_color(status)));
        }
    }
    out
}

fn card_section(out: &mut String, heading: &str, cards: &[Card], empty: &str) {
    let _ = writeln!(out, "\n{} ({})", heading.bold(), cards.len());
    if cards.is_empty() {
        let _ = writeln!(out, "  {}", paint(empty, DARK_THEME.muted));
    }
    for card in cards {
        let _ = writeln!(out, "{}", card_line(card));
    }
}

pub fn render_follow_up(view: &ViewModel) -> String {
    let FollowUp {
        completed_week,
        in_progress,
        overdue,
        upcoming,
        high_priority_pending,
    } = &view.follow_up;

    let mut out = format!("{}\n", title("Follow-Up Semanal"));
    card_section(&mut out, "🎯 Conquistas da semana", completed_week, "Nenhuma tarefa concluída nos últimos 7 dias.");
    card_section(&mut out, "⚡ Em andamento", in_progress, "Nada em andamento.");
    card_section(&mut out, "⚠️ Atrasadas", overdue, "Nenhuma tarefa atrasada.");
    card_section(&mut out, "📅 Próximos 7 dias", upcoming, "Nenhuma entrega prevista.");
    card_section(&mut out, "🔥 Prioridade alta pendente", high_priority_pending, "Nenhuma pendência crítica.");
    out
}

pub fn render_requests(sheet: &SheetView) -> String {
    let mut out = format!("{}\n", title("Requisições RC/PO"));

    for (status, count) in &sheet.view.status_counts {
        let _ = writeln!(out, "  {}: {count}", paint(status, status_color(status)));
    }

    let mut records: Vec<_> = sheet.records.iter().collect();
    records.sort_by(|a, b| (&a.category, &a.id).cmp(&(&b.category, &b.id)));
    for record in records {
        let mut line = format!(
            "\n  {} {} {}",
            record.category.bold(),
            record.field("rc_code"),
            paint(&record.status, status_color(&record.status))
        );
        let po = record.field("po_number");
        if !po.is_empty() {
            let _ = write!(line, " · PO {po}");
        }
        let _ = write!(line, "\n    {}", record.title);
        let nf = record.field("nf_tracking");
        if !nf.is_empty() {
            let _ = write!(line, "\n    NF: {}", paint(nf, DARK_THEME.muted));
        }
        if !record.owner.is_empty() {
            let _ = write!(line, "\n    comprador: {}", record.owner);
        }
        let _ = writeln!(out, "{line}");
    }
    out
}

pub fn render_team(view: &ViewModel) -> String {
    let mut out = format!("{}\n", title("Resumo por Analista"));
    if view.owners.is_empty() {
        let _ = writeln!(out, "  {}", paint("Nenhum responsável atribuído.", DARK_THEME.muted));
    }
    for (owner, summary) in &view.owners {
        let efficiency = if summary.total > 0 {
            summary.completed * 100 / summary.total
        } else {
            0
        };
        let _ = writeln!(
            out,
            "  {:<20} total {:>3} · concluídas {:>3} · pendentes {:>3} · atrasadas {:>3} · {}%",
            owner, summary.total, summary.completed, summary.pending, summary.overdue, efficiency
        );
    }
    out
}

pub fn render_snapshot(snapshot: &Snapshot, page: Page, sort: CategorySort) -> String {
    let mut sections = Vec::new();
    let tasks = snapshot.sheet(TASKS_SHEET);
    let requests = snapshot.sheet(REQUESTS_SHEET);
    let wants = |p: Page| page == p || page == Page::All;

    if let Some(tasks) = tasks {
        if wants(Page::Painel) {
            sections.push(render_kpis(&tasks.view));
            sections.push(render_charts(&tasks.view));
        }
        if wants(Page::Quadros) {
            sections.push(render_board(tasks));
        }
        if wants(Page::Categorias) {
            sections.push(render_categories(tasks, sort));
        }
        if wants(Page::FollowUp) {
            sections.push(render_follow_up(&tasks.view));
        }
        if wants(Page::Equipe) {
            sections.push(render_team(&tasks.view));
        }
        if wants(Page::Calendario) {
            sections.push(render_calendar(&tasks.view));
        }
    }
    if let Some(requests) = requests {
        if wants(Page::Requisicoes) {
            sections.push(render_requests(requests));
        }
    }
    // Custom sheets only have a board.
    for (name, sheet) in &snapshot.sheets {
        if name != TASKS_SHEET && name != REQUESTS_SHEET && (wants(Page::Quadros) || wants(Page::Painel)) {
            sections.push(render_kpis(&sheet.view));
            sections.push(render_board(sheet));
        }
    }

    let mut footer = format!(
        "{}",
        paint(
            &format!("Atualizado em {}", snapshot.refreshed_at.format("%d/%m/%Y %H:%M")),
            DARK_THEME.muted
        )
    );
    if !snapshot.skipped.is_empty() {
        let _ = write!(
            footer,
            "\n{}",
            paint(
                &format!("{} linhas ignoradas (veja o log)", snapshot.skipped.len()),
                DARK_THEME.danger
            )
        );
    }
    sections.push(footer);
    sections.join("\n")
}
