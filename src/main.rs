use std::{io::Write, path::PathBuf, process, sync::Arc};

use defter::{
    application::{
        error::AppError,
        notify::ChangeBridge,
        repos::{ChangeFeed, IdentityProvider},
        session::SessionObserver,
        store::PostStore,
    },
    config::{self, Command, CreateArgs, EditArgs, FilterArgs, Settings, SignInArgs},
    domain::{
        drafts::PostDraft,
        entities::PostId,
        posts::FilterCriteria,
        session::{Identity, Session},
        types::SortOrder,
    },
    infra::{
        error::InfraError,
        session_file::SessionFile,
        supabase::{SupabaseAuth, SupabaseClient, SupabasePosts, SupabaseRealtime},
        telemetry,
    },
    presentation::views,
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    eprintln!("error: {}", error.presentation_message());

    if dispatcher::has_been_set() {
        error!(error = %error, chain = ?report.messages, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, chain = ?report.messages, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;
    let backend = Backend::connect(&settings)?;

    match cli_args.command {
        Command::SignIn(args) => run_sign_in(&backend, args).await,
        Command::SignOut => run_sign_out(&backend).await,
        Command::Whoami => run_whoami(&backend).await,
        Command::List(filters) => run_list(&backend, filters).await,
        Command::Show(args) => run_show(&backend, PostId::new(args.id)).await,
        Command::Create(args) => run_create(&backend, args).await,
        Command::Edit(args) => run_edit(&backend, args).await,
        Command::Watch(filters) => run_watch(&backend, filters).await,
    }
}

/// Wired adapters for one invocation.
struct Backend {
    auth: Arc<SupabaseAuth>,
    posts: Arc<SupabasePosts>,
    realtime: SupabaseRealtime,
}

impl Backend {
    fn connect(settings: &Settings) -> Result<Self, AppError> {
        let client = Arc::new(SupabaseClient::new(&settings.supabase)?);
        let auth = Arc::new(SupabaseAuth::new(
            client.clone(),
            SessionFile::new(settings.session.file.clone()),
        ));
        let posts = Arc::new(SupabasePosts::new(
            client.clone(),
            settings.supabase.table.clone(),
        ));
        let realtime = SupabaseRealtime::new(
            client,
            settings.supabase.schema.clone(),
            settings.supabase.table.clone(),
            &settings.realtime,
        );

        Ok(Self {
            auth,
            posts,
            realtime,
        })
    }

    fn store(&self) -> Arc<PostStore> {
        Arc::new(PostStore::new(self.posts.clone(), self.posts.clone()))
    }

    fn observer(&self) -> SessionObserver {
        let provider: Arc<dyn IdentityProvider> = self.auth.clone();
        SessionObserver::start(provider)
    }
}

/// Resolve the session, failing unless someone is signed in.
async fn require_identity(observer: &SessionObserver) -> Result<Identity, AppError> {
    match observer.wait_resolved().await {
        Session::Authenticated(identity) => Ok(identity),
        Session::Anonymous | Session::Unresolved => Err(AppError::SignInRequired),
    }
}

async fn run_sign_in(backend: &Backend, args: SignInArgs) -> Result<(), AppError> {
    let password = read_password(&args).await?;
    let identity = backend
        .auth
        .sign_in_password(args.email.trim(), &password)
        .await?;
    print!("{}", views::render_identity(Some(&identity)));
    Ok(())
}

async fn read_password(args: &SignInArgs) -> Result<String, AppError> {
    if let Some(path) = args.password_file.as_ref() {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(InfraError::from)?;
        return Ok(raw.trim_end_matches(['\r', '\n']).to_string());
    }

    args.password_env
        .clone()
        .filter(|password| !password.is_empty())
        .ok_or_else(|| {
            AppError::validation("password is required (set DEFTER_PASSWORD or use --password-file)")
        })
}

async fn run_sign_out(backend: &Backend) -> Result<(), AppError> {
    backend.auth.sign_out().await?;
    print!("{}", views::render_identity(None));
    Ok(())
}

async fn run_whoami(backend: &Backend) -> Result<(), AppError> {
    let observer = backend.observer();
    let session = observer.wait_resolved().await;
    print!("{}", views::render_identity(session.identity()));
    observer.shutdown().await;
    Ok(())
}

async fn run_list(backend: &Backend, filters: FilterArgs) -> Result<(), AppError> {
    let observer = backend.observer();
    require_identity(&observer).await?;

    let store = backend.store();
    store.load_all().await?;

    let criteria = criteria_from(filters);
    print!("{}", views::render_filters(&criteria, &store.available_tags()));
    print!("{}", views::render_list(&store.snapshot(), &criteria));
    observer.shutdown().await;
    Ok(())
}

async fn run_show(backend: &Backend, id: PostId) -> Result<(), AppError> {
    let observer = backend.observer();
    require_identity(&observer).await?;

    let post = backend.store().get_by_id(&id).await?;
    print!("{}", views::render_detail(&post));
    observer.shutdown().await;
    Ok(())
}

async fn run_create(backend: &Backend, args: CreateArgs) -> Result<(), AppError> {
    let observer = backend.observer();
    let identity = require_identity(&observer).await?;

    let content = read_content(args.content, args.content_file).await?;
    let mut draft = PostDraft::new(
        args.title,
        args.summary,
        args.category,
        args.cover_image,
        content,
    );
    for tag in &args.tags {
        if !draft.add_tag(tag) {
            return Err(AppError::validation(format!(
                "tag `{tag}` rejected (blank, duplicate, or over the limit of 5)"
            )));
        }
    }

    let id = backend.store().create(draft, Some(&identity)).await?;
    println!("Created post {id}");
    observer.shutdown().await;
    Ok(())
}

async fn run_edit(backend: &Backend, args: EditArgs) -> Result<(), AppError> {
    let observer = backend.observer();
    require_identity(&observer).await?;

    let content = read_content(args.content, args.content_file).await?;
    let id = PostId::new(args.id);
    backend.store().update_content(&id, &content).await?;
    println!("Updated post {id}");
    observer.shutdown().await;
    Ok(())
}

/// Content from `--content-file` when given, otherwise `--content`.
async fn read_content(inline: Option<String>, file: Option<PathBuf>) -> Result<String, AppError> {
    if let Some(path) = file {
        return Ok(tokio::fs::read_to_string(&path)
            .await
            .map_err(InfraError::from)?);
    }
    inline.ok_or_else(|| AppError::validation("content is required (--content or --content-file)"))
}

async fn run_watch(backend: &Backend, filters: FilterArgs) -> Result<(), AppError> {
    let observer = backend.observer();
    require_identity(&observer).await?;

    let store = backend.store();
    let criteria = criteria_from(filters);
    let mut revisions = store.subscribe();
    let mut loading = store.subscribe_loading();
    let mut session = observer.subscribe();

    // Join the channel before the first fetch so no change falls between them.
    let feed: &dyn ChangeFeed = &backend.realtime;
    let bridge = ChangeBridge::attach(store.clone(), feed).await?;
    let initial = tokio::spawn({
        let store = store.clone();
        async move {
            if let Err(err) = store.load_all().await {
                warn!(error = %err, "Initial load failed; waiting for changes");
            }
        }
    });
    redraw(&store, &criteria);
    info!("Watching for changes; press Ctrl-C to stop");

    let outcome = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(error = %err, "Failed to listen for Ctrl-C");
                }
                break Ok(());
            }
            () = bridge.closed() => {
                break Err(AppError::unexpected(
                    "change feed closed; the list is no longer live",
                ));
            }
            changed = revisions.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                redraw(&store, &criteria);
            }
            changed = loading.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                redraw(&store, &criteria);
            }
            changed = session.changed() => {
                if changed.is_err() || session.borrow_and_update().identity().is_none() {
                    warn!("Session ended; stopping");
                    break Ok(());
                }
            }
        }
    };

    initial.abort();
    bridge.detach().await;
    observer.shutdown().await;
    outcome
}

fn redraw(store: &PostStore, criteria: &FilterCriteria) {
    let mut stdout = std::io::stdout().lock();
    let _ = write!(
        stdout,
        "\x1b[2J\x1b[H{}{}",
        views::render_filters(criteria, &store.available_tags()),
        views::render_list(&store.snapshot(), criteria)
    );
    let _ = stdout.flush();
}

fn criteria_from(filters: FilterArgs) -> FilterCriteria {
    let order = if filters.oldest {
        SortOrder::OldestFirst
    } else {
        SortOrder::NewestFirst
    };
    FilterCriteria::new(filters.category, order).with_tags(filters.tags)
}
