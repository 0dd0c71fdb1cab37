// src/main.rs
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use log::{error, info, warn};

use flow_board::aggregate::CategorySort;
use flow_board::cloud_handler::CloudHandler;
use flow_board::config::{Config, Credentials};
use flow_board::csv_handler::CSVHandler;
use flow_board::data_types::{DataSource, Priority, Record, REQUESTS_SHEET, TASKS_SHEET};
use flow_board::error::StoreError;
use flow_board::mapper::{self, ColumnRole};
use flow_board::store::TabularStore;
use flow_board::sync::Dashboard;
use flow_board::ui::{self, Page};

const UPDATE_INTERVAL: u64 = 5;

#[derive(Parser)]
#[command(name = "flow", version, about = "Team task dashboard over Google Sheets or CSV files")]
struct Cli {
    /// Secrets file (defaults to .flow/secrets.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Date the dashboard is computed for (YYYY-MM-DD)
    #[arg(long, global = true)]
    today: Option<NaiveDate>,

    #[arg(long, global = true)]
    no_color: bool,

    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Pending,
    Name,
    Overdue,
}

impl From<SortArg> for CategorySort {
    fn from(sort: SortArg) -> Self {
        match sort {
            SortArg::Pending => CategorySort::MostPending,
            SortArg::Name => CategorySort::Name,
            SortArg::Overdue => CategorySort::MostOverdue,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Refresh once and print the dashboard
    #[command(alias = "refresh")]
    Sync {
        #[arg(long, value_enum, default_value = "all")]
        view: Page,
        #[arg(long, value_enum, default_value = "pending")]
        sort: SortArg,
    },
    /// Refresh periodically, keeping the last good view on failures
    Watch {
        /// Seconds between refreshes
        #[arg(long, default_value_t = UPDATE_INTERVAL)]
        interval: u64,
        #[arg(long, value_enum, default_value = "painel")]
        view: Page,
        #[arg(long, value_enum, default_value = "pending")]
        sort: SortArg,
    },
    /// Add a record to a sheet
    Add {
        title: String,
        #[arg(long)]
        category: String,
        #[arg(long, default_value = TASKS_SHEET)]
        sheet: String,
        /// Defaults to the first status of the sheet's vocabulary
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        owner: Option<String>,
        /// Defaults to the current time in milliseconds
        #[arg(long)]
        id: Option<String>,
        /// Free-text column, as column=value
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
    /// Move a record to another status column
    Move {
        id: String,
        status: String,
        #[arg(long, default_value = TASKS_SHEET)]
        sheet: String,
    },
    /// Append a follow-up note to a task
    Note { task_id: String, content: String },
    /// Show the follow-up history of a task
    Notes { task_id: String },
    /// Replace the text of a follow-up note
    NoteEdit { id: String, content: String },
    /// Remove a follow-up note
    NoteDelete { id: String },
    /// Manage task categories
    #[command(subcommand)]
    Category(CategoryCommand),
    /// Check that the configured sheets exist and have the expected headers
    Verify,
    /// Create missing sheets with their header rows
    Init,
}

#[derive(Subcommand)]
enum CategoryCommand {
    List,
    Add {
        name: String,
        #[arg(long, default_value = "")]
        icon: String,
    },
    /// Remove by key or name
    Remove { category: String },
}

fn parse_field(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .ok_or_else(|| format!("expected column=value, got {value:?}"))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    if cli.no_color {
        colored::control::set_override(false);
    }

    if let Err(err) = run(cli).await {
        match err.downcast_ref::<StoreError>() {
            Some(store_err) if store_err.is_retryable() => {
                eprintln!("{} {err:#}", "Falha de conexão:".red().bold());
                eprintln!("Verifique a rede e tente novamente.");
            }
            Some(StoreError::NotFound(_)) => {
                eprintln!("{} {err:#}", "Configuração inválida:".red().bold());
                eprintln!("Confira SPREADSHEET_ID e as permissões da conta de serviço, ou rode `flow init`.");
            }
            _ => eprintln!("{} {err:#}", "Erro:".red().bold()),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let store = open_store(&config).await?;
    let mut dashboard = Dashboard::standard(
        store,
        config.tasks_vocabulary.clone(),
        config.requests_vocabulary.clone(),
        &config.user_email,
    );
    let now = |today: Option<NaiveDate>| -> NaiveDateTime {
        let now = Local::now().naive_local();
        today.map_or(now, |d| d.and_time(now.time()))
    };

    match cli.command.unwrap_or(Command::Sync {
        view: Page::All,
        sort: SortArg::Pending,
    }) {
        Command::Sync { view, sort } => {
            let snapshot = dashboard.refresh_at(now(cli.today)).await?;
            println!("{}", ui::render_snapshot(snapshot, view, sort.into()));
        }
        Command::Watch {
            interval,
            view,
            sort,
        } => {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = tokio::signal::ctrl_c() => break,
                }
                match dashboard.refresh_at(now(cli.today)).await {
                    Ok(snapshot) => {
                        // Clear the screen before redrawing.
                        print!("\x1B[2J\x1B[H");
                        println!("{}", ui::render_snapshot(snapshot, view, sort.into()));
                    }
                    Err(err) if err.is_retryable() || matches!(err, StoreError::SchemaMismatch(_)) => {
                        warn!("refresh failed, keeping the last view: {err}");
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
        Command::Add {
            title,
            category,
            sheet,
            status,
            priority,
            due,
            owner,
            id,
            fields,
        } => {
            // Validate against the categories in effect, including the Categories sheet.
            dashboard.refresh_at(now(cli.today)).await?;
            let schema = dashboard.schema(&sheet)?;
            let vocabulary = &schema.vocabulary;
            let mut record = Record {
                id: id.unwrap_or_else(|| Local::now().timestamp_millis().to_string()),
                title,
                owner: owner.unwrap_or_default(),
                ..Record::default()
            };

            record.category = match vocabulary.category(&category) {
                Some(info) => info.name.clone(),
                None => bail!("unknown category {category:?} for {sheet}"),
            };
            record.status = match status {
                Some(status) => status,
                None => vocabulary.statuses.first().cloned().unwrap_or_default(),
            };
            record.priority = match priority {
                Some(p) => match Priority::parse(&p) {
                    Some(p) => Some(p),
                    None => bail!("unknown priority {p:?}"),
                },
                None => None,
            };
            record.due_date = match due {
                Some(due) => mapper::parse_date(&due).map_err(anyhow::Error::msg)?,
                None => None,
            };

            let text_columns: Vec<&str> = schema
                .columns
                .iter()
                .filter(|c| c.role == ColumnRole::Text)
                .map(|c| c.name.as_str())
                .collect();
            for created in ["createdAt", "created_at"] {
                if text_columns.contains(&created) {
                    record.fields.insert(
                        created.to_string(),
                        now(cli.today).format("%Y-%m-%dT%H:%M:%S").to_string(),
                    );
                }
            }
            for (column, value) in fields {
                if !text_columns.contains(&column.as_str()) {
                    bail!("{sheet} has no free-text column {column:?}");
                }
                record.fields.insert(column, value);
            }

            dashboard.add_record(&sheet, &record).await?;
            println!("{} {} ({})", "Adicionado:".green(), record.title, record.id);
        }
        Command::Move { id, status, sheet } => {
            dashboard.refresh_at(now(cli.today)).await?;
            let record = dashboard.set_status(&sheet, &id, &status).await?;
            println!("{} {} → {}", "Movido:".green(), record.title, record.status);
        }
        Command::Note { task_id, content } => {
            let update = dashboard.add_update(&task_id, &content, now(cli.today)).await?;
            println!(
                "{} {} por {} ({})",
                "Nota registrada:".green(),
                update.timestamp,
                update.user,
                update.id
            );
        }
        Command::Notes { task_id } => {
            let updates = dashboard.updates_for(&task_id).await?;
            if updates.is_empty() {
                println!("Nenhuma atualização para {task_id}.");
            }
            for update in updates {
                println!(
                    "{} {} {}",
                    update.timestamp.dimmed(),
                    update.user.bold(),
                    format!("#{}", update.id).dimmed()
                );
                println!("  {}", update.content);
            }
        }
        Command::NoteEdit { id, content } => {
            let update = dashboard.edit_update(&id, &content, now(cli.today)).await?;
            println!("{} {} {}", "Nota editada:".green(), update.id, update.timestamp);
        }
        Command::NoteDelete { id } => {
            let update = dashboard.delete_update(&id).await?;
            println!("{} {} ({})", "Nota removida:".green(), update.id, update.content);
        }
        Command::Category(CategoryCommand::List) => {
            for info in dashboard.category_list().await? {
                println!("  {}  {}", info.key, info.color.dimmed());
            }
        }
        Command::Category(CategoryCommand::Add { name, icon }) => {
            let info = dashboard.add_category(&icon, &name).await?;
            println!("{} {}", "Categoria criada:".green(), info.key);
        }
        Command::Category(CategoryCommand::Remove { category }) => {
            let info = dashboard.remove_category(&category).await?;
            println!("{} {}", "Categoria removida:".green(), info.key);
        }
        Command::Verify => verify(&dashboard).await?,
        Command::Init => {
            let created = dashboard.init_sheets().await?;
            if created.is_empty() {
                println!("Todas as abas já existem.");
            }
            for sheet in created {
                println!("{} {sheet}", "Criada:".green());
            }
        }
    }
    Ok(())
}

async fn open_store(config: &Config) -> Result<Box<dyn TabularStore>> {
    match &config.source {
        DataSource::Local(dir) => {
            info!("using local files in {}", dir.display());
            Ok(Box::new(CSVHandler::new(dir.clone())))
        }
        DataSource::Cloud(spreadsheet_id) => {
            let key = match &config.credentials {
                Some(Credentials::Inline(key)) => key.clone(),
                Some(Credentials::KeyFile(path)) => CloudHandler::read_key(path)?,
                None => bail!("cloud backend selected without credentials"),
            };
            let handler = CloudHandler::connect(key, spreadsheet_id).await?;
            let title = handler.spreadsheet_title().await?;
            if title != config.sheet_name {
                warn!(
                    "spreadsheet {spreadsheet_id} is titled {title:?}, expected {:?}",
                    config.sheet_name
                );
            }
            Ok(Box::new(handler))
        }
    }
}

async fn verify(dashboard: &Dashboard) -> Result<()> {
    let store = dashboard.store();
    println!("Fonte: {}", store.describe());
    let existing = store.list_sheets().await?;

    let mut problems = 0;
    for sheet in [TASKS_SHEET, REQUESTS_SHEET] {
        let schema = dashboard.schema(sheet)?;
        if !existing.iter().any(|s| s == sheet) {
            println!("  {} {sheet}: aba ausente", "✗".red());
            problems += 1;
            continue;
        }
        let table = store.fetch(sheet).await?;
        if table.is_empty() {
            println!("  {} {sheet}: vazia", "•".yellow());
            continue;
        }
        match mapper::check_headers(&table.headers, schema) {
            Ok(()) => println!("  {} {sheet}: {} linhas", "✓".green(), table.rows.len()),
            Err(err) => {
                println!("  {} {sheet}: {err}", "✗".red());
                problems += 1;
            }
        }
    }

    if problems > 0 {
        error!("{problems} sheet(s) need attention");
        bail!("{problems} sheet(s) failed verification");
    }
    Ok(())
}
