mod present;
mod store;

use clap::{Parser, Subcommand};
use listgrid_api::StoreError;
use listgrid_engine::{EditDraft, GridError, ListGrid, ListGridConfig, RelatedQuery, StatusPolicy};
use serde_json::Value;

use crate::present::{print_json, settle};

#[derive(Parser)]
#[command(name = "listgrid", about = "View-driven list grids over SharePoint lists")]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(long, default_value = "listgrid.toml", env = "LISTGRID_CONFIG")]
    config: String,

    /// Bearer token for the SharePoint store, overrides the config file.
    #[arg(long, env = "LISTGRID_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Print empty results instead of failing on read errors.
    #[arg(long)]
    lenient: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Columns and rows of a view, lookups resolved.
    Grid {
        #[arg(long)]
        view: Option<String>,
        /// Boolean field to include in every row.
        #[arg(long)]
        toggle: Option<String>,
    },
    /// Child rows of the configured related list matching a parent value.
    Related {
        /// Parent value, as JSON (`10`, `true`, `"AB123"`) or plain text.
        value: String,
        /// Child view; defaults to `[related].child_view_id`, none means inferred columns.
        #[arg(long)]
        view: Option<String>,
    },
    /// Edit schema (field descriptors and controls).
    Schema {
        /// Fields to describe; defaults to the view's fields.
        fields: Vec<String>,
        #[arg(long)]
        view: Option<String>,
    },
    /// Current values of one item as an edit draft.
    Item {
        id: i64,
        #[arg(long)]
        view: Option<String>,
    },
    /// Write a draft (JSON object keyed by internal name) to an item.
    Update {
        id: i64,
        #[arg(long)]
        set: String,
    },
    /// Create an item from a draft.
    Add {
        #[arg(long)]
        set: String,
    },
    /// Flip the toggle field of an item.
    Toggle {
        id: i64,
        #[arg(long)]
        field: Option<String>,
    },
    /// Move an item to the recycle bin.
    Recycle { id: i64 },
    /// Lookup options of a target list.
    Options { list: String },
    /// Visible lists of the site.
    Lists,
    /// Visible fields of a list (the grid's list by default).
    Fields { list: Option<String> },
    /// Whether the current user may edit.
    CanEdit,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    tracing::info!(config = %cli.config, "loading configuration");
    let config = match ListGridConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&cli, &config).await {
        tracing::error!(kind = %e.kind(), error = %e, "command failed");
        std::process::exit(1);
    }
}

async fn run(cli: &Cli, config: &ListGridConfig) -> Result<(), GridError> {
    let store = store::open(&config.store, cli.token.as_deref())?;
    let grid = ListGrid::new(store, config.grid.list_id.clone());
    let lenient = cli.lenient;

    match &cli.command {
        Command::Grid { view, toggle } => {
            let view = view_id(view, config)?;
            let toggle = toggle.as_deref().or(config.grid.toggle_field.as_deref());
            let mut loaded = settle(grid.view_grid(&view, toggle).await, lenient)?;
            if config.status.enabled {
                let policy = settle(
                    StatusPolicy::load(grid.store(), &config.status).await.map(Some),
                    lenient,
                )?;
                if let Some(policy) = policy {
                    policy.annotate(&mut loaded.rows);
                }
            }
            print_json(&loaded)
        }
        Command::Related { value, view } => {
            let related = config
                .related
                .as_ref()
                .ok_or_else(|| GridError::Config("[related] section is required".into()))?;
            let parent_value = parse_value(value);
            let query = RelatedQuery {
                child_list_id: &related.child_list_id,
                child_field: &related.child_field,
                parent_value: &parent_value,
            };
            let loaded = match view.as_deref().or(related.child_view_id.as_deref()) {
                Some(child_view) => grid.related_grid_by_view(&query, child_view).await,
                None => grid.related_items(&query).await,
            };
            print_json(&settle(loaded, lenient)?)
        }
        Command::Schema { fields, view } => {
            let names = field_names(&grid, fields, view, config).await?;
            print_json(&settle(grid.edit_schema(&names).await, lenient)?)
        }
        Command::Item { id, view } => {
            let names = field_names(&grid, &[], view, config).await?;
            let schema = grid.fields_meta(&names).await?;
            print_json(&settle(grid.item_values(*id, &schema).await, lenient)?)
        }
        Command::Update { id, set } => {
            require_editor(&grid, config).await?;
            let draft = parse_draft(set)?;
            let names: Vec<String> = draft.keys().cloned().collect();
            let schema = grid.fields_meta(&names).await?;
            grid.update_fields(*id, &schema, &draft).await?;
            tracing::info!(id, fields = names.len(), "item updated");
            Ok(())
        }
        Command::Add { set } => {
            require_editor(&grid, config).await?;
            let draft = parse_draft(set)?;
            let names: Vec<String> = draft.keys().cloned().collect();
            let schema = grid.fields_meta(&names).await?;
            let id = grid.add_item(&schema, &draft).await?;
            print_json(&serde_json::json!({ "id": id }))
        }
        Command::Toggle { id, field } => {
            require_editor(&grid, config).await?;
            let field = field
                .as_deref()
                .or(config.grid.toggle_field.as_deref())
                .ok_or_else(|| GridError::Config("no toggle field configured".into()))?;
            let value = grid.toggle(*id, field).await?;
            print_json(&serde_json::json!({ "id": id, "field": field, "value": value }))
        }
        Command::Recycle { id } => {
            require_editor(&grid, config).await?;
            grid.recycle(*id).await
        }
        Command::Options { list } => print_json(&settle(grid.lookup_options(list).await, lenient)?),
        Command::Lists => print_json(&settle(grid.site_lists().await, lenient)?),
        Command::Fields { list } => {
            let list = list.as_deref().unwrap_or(grid.list_id());
            print_json(&settle(grid.list_fields(list).await, lenient)?)
        }
        Command::CanEdit => {
            let allowed = settle(grid.user_in_group(&config.grid.edit_group).await, lenient)?;
            print_json(&serde_json::json!({ "group": config.grid.edit_group, "canEdit": allowed }))
        }
    }
}

fn view_id(view: &Option<String>, config: &ListGridConfig) -> Result<String, GridError> {
    view.clone()
        .or_else(|| config.grid.view_id.clone())
        .ok_or_else(|| GridError::Config("no view given and [grid].view_id is not set".into()))
}

async fn field_names(
    grid: &ListGrid,
    fields: &[String],
    view: &Option<String>,
    config: &ListGridConfig,
) -> Result<Vec<String>, GridError> {
    if !fields.is_empty() {
        return Ok(fields.to_vec());
    }
    grid.view_field_names(&view_id(view, config)?).await
}

async fn require_editor(grid: &ListGrid, config: &ListGridConfig) -> Result<(), GridError> {
    if grid.user_in_group(&config.grid.edit_group).await? {
        Ok(())
    } else {
        Err(StoreError::unauthorized(format!(
            "current user is not a member of '{}'",
            config.grid.edit_group
        ))
        .into())
    }
}

/// JSON when it parses, plain text otherwise.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_draft(raw: &str) -> Result<EditDraft, GridError> {
    serde_json::from_str(raw).map_err(|e| GridError::invalid_value("--set", e.to_string()))
}
