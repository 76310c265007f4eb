use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::Serialize;
use wikibridge_core::batch::{BatchDeleteRequest, BatchSelector, batch_delete};
use wikibridge_core::config::{BridgeConfig, load_config};
use wikibridge_core::deletion::{DeletionMode, HierarchyDeleteRequest, delete_page, plan_and_delete};
use wikibridge_core::error::BridgeError;
use wikibridge_core::graphql::WikiJsClient;
use wikibridge_core::hierarchy::{
    DocFileSpec, DocsHierarchyRequest, EnsurePathRequest, NestedPageRequest, StructureRequest,
    create_documentation_hierarchy, create_nested_page, create_structure, ensure_path,
    get_children,
};
use wikibridge_core::ledger::SqliteLedger;
use wikibridge_core::logging::{LogSettings, init_logging};
use wikibridge_core::mapping::{
    DEFAULT_RELATIONSHIP, LinkRequest, check_drift, link_file_to_page, repository_context, unlink,
};
use wikibridge_core::pages::{
    CreatePageRequest, connection_status, create_page, get_page, list_spaces, search_pages,
    update_page,
};
use wikibridge_core::reconcile::reconcile;
use wikibridge_core::runtime::{
    PathOverrides, ResolutionContext, ResolvedPaths, normalize_for_display, resolve_paths,
};
use wikibridge_core::slug;
use wikibridge_core::store::{PageKey, PageUpdate};

#[derive(Debug, Parser)]
#[command(
    name = "wikibridge",
    version,
    about = "Manage Wiki.js page hierarchies and source-file to page mappings"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH", help = "Mapping ledger database")]
    db: Option<PathBuf>,
    #[arg(short, long, global = true, help = "Log at debug level")]
    verbose: bool,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics to stderr")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    db: Option<PathBuf>,
    verbose: bool,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            db: cli.db.clone(),
            verbose: cli.verbose,
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Check the Wiki.js connection and credentials")]
    Status,
    Page(PageArgs),
    Tree(TreeArgs),
    #[command(about = "List top-level path groups with page counts")]
    Spaces,
    Map(MapArgs),
    Db(DbArgs),
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct PageKeyArgs {
    #[arg(long, value_name = "ID")]
    id: Option<i64>,
    #[arg(long, value_name = "PATH")]
    path: Option<String>,
}

impl PageKeyArgs {
    fn key(&self) -> Result<PageKey> {
        match (self.id, self.path.as_deref()) {
            (Some(id), None) => Ok(PageKey::Id(id)),
            (None, Some(path)) => Ok(PageKey::Path(path.trim().trim_matches('/').to_string())),
            _ => bail!("exactly one of --id or --path is required"),
        }
    }
}

#[derive(Debug, Args)]
struct ContentArgs {
    #[arg(long, conflicts_with = "content_file", help = "Page body")]
    content: Option<String>,
    #[arg(long, value_name = "PATH", help = "Read the page body from a file")]
    content_file: Option<PathBuf>,
}

impl ContentArgs {
    fn resolve(&self) -> Result<Option<String>> {
        if let Some(path) = &self.content_file {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            return Ok(Some(content));
        }
        Ok(self.content.clone())
    }
}

#[derive(Debug, Args)]
struct PageArgs {
    #[command(subcommand)]
    command: PageSubcommand,
}

#[derive(Debug, Subcommand)]
enum PageSubcommand {
    Create {
        title: String,
        #[command(flatten)]
        content: ContentArgs,
        #[arg(long, help = "Page path (defaults to the normalized title)")]
        path: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_name = "ID")]
        parent_id: Option<i64>,
    },
    Get {
        #[command(flatten)]
        key: PageKeyArgs,
    },
    Update {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        content: ContentArgs,
        #[arg(long)]
        description: Option<String>,
    },
    Search {
        #[arg(default_value = "*")]
        query: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    Delete {
        #[command(flatten)]
        key: PageKeyArgs,
        #[arg(long, help = "Actually delete")]
        confirm: bool,
        #[arg(long, help = "Leave file mappings for the page in place")]
        keep_mappings: bool,
    },
    Children {
        #[command(flatten)]
        key: PageKeyArgs,
    },
}

#[derive(Debug, Args)]
struct TreeArgs {
    #[command(subcommand)]
    command: TreeSubcommand,
}

#[derive(Debug, Subcommand)]
enum TreeSubcommand {
    #[command(about = "Ensure a page exists at PATH, creating missing ancestors")]
    Ensure {
        path: String,
        #[arg(long, help = "Leaf title (defaults to the title-cased last segment)")]
        title: Option<String>,
        #[command(flatten)]
        content: ContentArgs,
        #[arg(long)]
        description: Option<String>,
    },
    #[command(about = "Create a page under an existing or ensured parent path")]
    Nested {
        title: String,
        #[arg(long, value_name = "PATH")]
        parent: String,
        #[command(flatten)]
        content: ContentArgs,
        #[arg(long, help = "Fail instead of creating missing parents")]
        no_create_parents: bool,
    },
    #[command(about = "Create a project root page with standard sections")]
    Structure {
        root_title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long = "section", value_name = "TITLE")]
        sections: Vec<String>,
    },
    #[command(about = "Create a documentation hierarchy from a JSON list of files")]
    Docs {
        project_name: String,
        #[arg(long, value_name = "PATH", help = "JSON array of {file_path, doc_path?}")]
        files: PathBuf,
    },
    #[command(about = "Delete a page hierarchy deepest-first (preview unless --confirm)")]
    Delete {
        root: String,
        #[arg(long, default_value = "children-only")]
        mode: DeletionMode,
        #[arg(long)]
        confirm: bool,
        #[arg(long)]
        keep_mappings: bool,
    },
    #[command(name = "batch-delete", about = "Delete pages by ids, paths or a * pattern")]
    BatchDelete {
        #[arg(long = "id", value_name = "ID")]
        ids: Vec<i64>,
        #[arg(long = "path", value_name = "PATH")]
        paths: Vec<String>,
        #[arg(long)]
        pattern: Option<String>,
        #[arg(long)]
        confirm: bool,
        #[arg(long)]
        keep_mappings: bool,
    },
}

#[derive(Debug, Args)]
struct MapArgs {
    #[command(subcommand)]
    command: MapSubcommand,
}

#[derive(Debug, Subcommand)]
enum MapSubcommand {
    Link {
        file: PathBuf,
        page_id: i64,
        #[arg(long, default_value = DEFAULT_RELATIONSHIP)]
        relationship: String,
    },
    Unlink {
        file: PathBuf,
    },
    List,
    Drift,
    #[command(about = "Remove mappings whose page no longer exists")]
    Reconcile,
}

#[derive(Debug, Args)]
struct DbArgs {
    #[command(subcommand)]
    command: DbSubcommand,
}

#[derive(Debug, Subcommand)]
enum DbSubcommand {
    Migrate,
}

struct Session {
    paths: ResolvedPaths,
    config: BridgeConfig,
}

impl Session {
    fn client(&self) -> Result<WikiJsClient> {
        WikiJsClient::new(self.config.client_settings())
    }

    fn ledger(&self) -> Result<SqliteLedger> {
        SqliteLedger::open(&self.paths.db_path)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);
    let Some(command) = cli.command else {
        let mut command = Cli::command();
        command.print_help()?;
        println!();
        return Ok(());
    };

    let session = open_session(&runtime)?;
    let result = run_command(&session, command);
    if let Err(error) = &result
        && let Some(bridge_error) = error.downcast_ref::<BridgeError>()
    {
        tracing::error!(kind = bridge_error.kind(), "command failed");
    }
    result
}

fn run_command(session: &Session, command: Commands) -> Result<()> {
    match command {
        Commands::Status => run_status(session),
        Commands::Page(PageArgs { command }) => run_page(session, command),
        Commands::Tree(TreeArgs { command }) => run_tree(session, command),
        Commands::Spaces => {
            let mut client = session.client()?;
            print_json(&list_spaces(&mut client)?)
        }
        Commands::Map(MapArgs { command }) => run_map(session, command),
        Commands::Db(DbArgs {
            command: DbSubcommand::Migrate,
        }) => {
            let report = SqliteLedger::migrate(&session.paths.db_path)?;
            tracing::info!(
                db = %normalize_for_display(&session.paths.db_path),
                applied = report.applied.len(),
                "ledger migrations complete"
            );
            print_json(&report)
        }
    }
}

fn run_status(session: &Session) -> Result<()> {
    let mut client = session.client()?;
    let status = connection_status(&mut client);
    print_json(&status)?;
    if !status.connected {
        bail!("Wiki.js is not reachable at {}", status.api_url);
    }
    Ok(())
}

fn run_page(session: &Session, command: PageSubcommand) -> Result<()> {
    let mut client = session.client()?;
    match command {
        PageSubcommand::Create {
            title,
            content,
            path,
            description,
            parent_id,
        } => {
            let request = CreatePageRequest {
                title,
                content: content.resolve()?.unwrap_or_default(),
                path,
                description,
                parent_id,
            };
            print_json(&create_page(&mut client, &request)?)
        }
        PageSubcommand::Get { key } => print_json(&get_page(&mut client, &key.key()?)?),
        PageSubcommand::Update {
            id,
            title,
            content,
            description,
        } => {
            let update = PageUpdate {
                title,
                content: content.resolve()?,
                description,
            };
            print_json(&update_page(&mut client, id, &update)?)
        }
        PageSubcommand::Search { query, limit } => {
            print_json(&search_pages(&mut client, &query, limit)?)
        }
        PageSubcommand::Delete {
            key,
            confirm,
            keep_mappings,
        } => {
            let mut ledger = session.ledger()?;
            let report = delete_page(&mut client, &mut ledger, &key.key()?, confirm, !keep_mappings)?;
            print_json(&report)
        }
        PageSubcommand::Children { key } => print_json(&get_children(&mut client, &key.key()?)?),
    }
}

fn run_tree(session: &Session, command: TreeSubcommand) -> Result<()> {
    let mut client = session.client()?;
    match command {
        TreeSubcommand::Ensure {
            path,
            title,
            content,
            description,
        } => {
            let leaf_title = match title {
                Some(title) => title,
                None => {
                    let normalized = slug::normalize_path(&path)?;
                    slug::title_from_segment(slug::last_segment(&normalized))
                }
            };
            let leaf_content = content
                .resolve()?
                .unwrap_or_else(|| format!("# {leaf_title}\n"));
            let request = EnsurePathRequest {
                full_path: path,
                leaf_title,
                leaf_content,
                description,
            };
            print_json(&ensure_path(&mut client, &request)?)
        }
        TreeSubcommand::Nested {
            title,
            parent,
            content,
            no_create_parents,
        } => {
            let request = NestedPageRequest {
                content: content
                    .resolve()?
                    .unwrap_or_else(|| format!("# {title}\n")),
                title,
                parent_path: parent,
                create_parents: !no_create_parents,
            };
            print_json(&create_nested_page(&mut client, &request)?)
        }
        TreeSubcommand::Structure {
            root_title,
            description,
            sections,
        } => {
            let request = StructureRequest {
                root_title,
                description,
                sections,
            };
            print_json(&create_structure(&mut client, &request)?)
        }
        TreeSubcommand::Docs {
            project_name,
            files,
        } => {
            let files = load_doc_files(&files)?;
            let mut ledger = session.ledger()?;
            let request = DocsHierarchyRequest {
                project_name,
                files,
                repository_root: session.paths.project_root.clone(),
            };
            print_json(&create_documentation_hierarchy(&mut client, &mut ledger, &request)?)
        }
        TreeSubcommand::Delete {
            root,
            mode,
            confirm,
            keep_mappings,
        } => {
            let mut ledger = session.ledger()?;
            let mut request = HierarchyDeleteRequest::new(root, mode).confirmed(confirm);
            request.remove_file_mappings = !keep_mappings;
            let report = plan_and_delete(
                &mut client,
                &mut ledger,
                session.config.traversal_limits(),
                &request,
            )?;
            print_json(&report)
        }
        TreeSubcommand::BatchDelete {
            ids,
            paths,
            pattern,
            confirm,
            keep_mappings,
        } => {
            let mut ledger = session.ledger()?;
            let request = BatchDeleteRequest {
                selector: BatchSelector::from_parts(ids, paths, pattern)?,
                confirmed: confirm,
                remove_file_mappings: !keep_mappings,
            };
            print_json(&batch_delete(&mut client, &mut ledger, &request)?)
        }
    }
}

fn run_map(session: &Session, command: MapSubcommand) -> Result<()> {
    let mut ledger = session.ledger()?;
    let root = &session.paths.project_root;
    match command {
        MapSubcommand::Link {
            file,
            page_id,
            relationship,
        } => {
            let mut client = session.client()?;
            let request = LinkRequest {
                file_path: file,
                page_id,
                relationship,
            };
            print_json(&link_file_to_page(&mut client, &mut ledger, root, &request)?)
        }
        MapSubcommand::Unlink { file } => print_json(&unlink(&mut ledger, root, &file)?),
        MapSubcommand::List => print_json(&repository_context(&ledger, root)?),
        MapSubcommand::Drift => print_json(&check_drift(&ledger, root)?),
        MapSubcommand::Reconcile => {
            let mut client = session.client()?;
            print_json(&reconcile(&mut client, &mut ledger)?)
        }
    }
}

fn open_session(runtime: &RuntimeOptions) -> Result<Session> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    init_logging(&LogSettings::resolve(
        &config,
        &paths.project_root,
        runtime.verbose,
    ))?;
    if runtime.diagnostics {
        eprintln!("[diagnostics]\n{}", paths.diagnostics());
    }
    tracing::debug!(
        project_root = %normalize_for_display(&paths.project_root),
        root_source = paths.root_source.as_str(),
        "resolved runtime paths"
    );
    Ok(Session { paths, config })
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
        db: runtime.db.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn load_doc_files(path: &Path) -> Result<Vec<DocFileSpec>> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse file list in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
