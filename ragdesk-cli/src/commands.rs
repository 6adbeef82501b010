//! CLI subcommand handlers.

use anyhow::Context;
use dialoguer::Confirm;
use ragdesk_core::evaluation_csv::PREVIEW_ROWS;
use ragdesk_core::payload::{S3Location, AVAILABLE_AGENTS, AVAILABLE_TOOLS};
use ragdesk_core::{
    assemble, config_exists, load_config, render_fields, render_text, ConfigError, ConsoleConfig,
    DeveloperSession, DocumentSource, FieldType, FormState, HttpBackend, JobStore, JobTracker,
    MainMode, Operation, RagBackend, ResponseView, SubMode, SubmissionController, UseCaseCatalog,
};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::{Commands, ConfigAction, EvaluateArgs, RunArgs, TestArgs, UploadArgs};

/// Flags that apply to every subcommand.
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    pub workspace: PathBuf,
    pub config_file: Option<PathBuf>,
    pub base_url: Option<String>,
    pub quiet: bool,
}

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, options: &GlobalOptions) -> anyhow::Result<()> {
    match command {
        Commands::Upload(args) => handle_upload(args, options).await,
        Commands::Test(args) => handle_test(args, options).await,
        Commands::Evaluate(args) => handle_evaluate(args, options).await,
        Commands::Status { job } => handle_status(&job, options).await,
        Commands::Download {
            job,
            download_url,
            print,
        } => handle_download(&job, download_url, print, options).await,
        Commands::Form { use_case, values } => handle_form(&use_case, &values, options).await,
        Commands::Catalog { use_case } => handle_catalog(use_case.as_deref(), options),
        Commands::Config { action } => handle_config(action, options),
    }
}

fn load(options: &GlobalOptions) -> anyhow::Result<ConsoleConfig> {
    if let Some(file) = &options.config_file {
        if !file.exists() {
            return Err(ConfigError::FileNotFound { path: file.clone() }.into());
        }
    }

    let mut config = load_config(
        Some(&options.workspace),
        options.config_file.as_deref(),
        None,
    )
    .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    if let Some(base_url) = &options.base_url {
        config.api.base_url = base_url.clone();
    }

    let problems = config.validate();
    if !problems.is_empty() {
        return Err(ConfigError::Invalid {
            message: problems.join("; "),
        }
        .into());
    }
    Ok(config)
}

/// Build the HTTP backend, routing operations to a use case's endpoints if one is named.
fn backend_for(config: &ConsoleConfig, use_case: Option<&str>) -> anyhow::Result<HttpBackend> {
    let mut backend = HttpBackend::new(&config.api)?;
    if let Some(name) = use_case {
        let use_case = UseCaseCatalog::new(config.use_cases_dir.clone()).load(name)?;
        for operation in [Operation::Upload, Operation::Test, Operation::Evaluate] {
            let url = backend.resolve_url(use_case.endpoint_for(operation))?;
            backend = backend.with_endpoint(operation, url);
        }
        info!(use_case = name, "Using use-case endpoints");
    }
    Ok(backend)
}

pub(crate) fn upload_session(args: UploadArgs, config: &ConsoleConfig) -> DeveloperSession {
    let mut session = DeveloperSession::with_defaults(&config.defaults);
    session.main_mode = MainMode::Upload;
    session.usecase_id = args.usecase_id.unwrap_or_default();
    session.is_vector = args.vector;
    if let Some(chunk_size) = &args.chunk_size {
        session.set_chunk_size(chunk_size);
    }
    if let Some(overlap) = &args.overlap {
        session.set_overlap(overlap);
    }

    match args.s3_bucket {
        Some(bucket_name) => {
            if !args.files.is_empty() {
                warn!("Reading from S3; ignoring files given on the command line");
            }
            session.document_source = DocumentSource::S3;
            session.s3 = S3Location {
                bucket_name,
                region: args.s3_region.unwrap_or_default(),
                prefix: args.s3_prefix.unwrap_or_default(),
            };
        }
        None => {
            let requested = args.files.len();
            let added = session.add_attachments(args.files);
            if added < requested {
                warn!(skipped = requested - added, "Only PDF files can be uploaded");
            }
        }
    }
    session
}

fn apply_run_args(session: &mut DeveloperSession, run: &RunArgs) {
    if let Some(top_k) = &run.top_k {
        session.top_k_input = top_k.clone();
    }
    if let Some(temperature) = &run.temperature {
        session.temperature_input = temperature.clone();
    }
    if let Some(max_tokens) = &run.max_tokens {
        session.max_tokens_input = max_tokens.clone();
    }
    if let Some(prompt) = &run.system_prompt {
        session.system_prompt = prompt.clone();
    }
    session.is_vector = run.vector;

    for id in &run.tools {
        if !AVAILABLE_TOOLS.iter().any(|t| t.id == id.as_str()) {
            warn!(tool = %id, "Unknown tool, sending anyway");
        }
        if !session.selected_tools().contains(id) {
            session.toggle_tool(id);
        }
    }

    session.agentic_enabled = run.agentic;
    if !run.agentic && !run.agents.is_empty() {
        warn!("Agents are only sent in agentic mode; pass --agentic to use them");
    }
    for id in &run.agents {
        if !AVAILABLE_AGENTS.iter().any(|a| a.id == id.as_str()) {
            warn!(agent = %id, "Unknown agent, sending anyway");
        }
        if !session.selected_agents().contains(id) {
            session.toggle_agent(id);
        }
    }

    if let Some(guardrails) = &run.guardrails {
        session.guardrails_enabled = true;
        session.guardrails = guardrails.clone();
    }

    match &run.api_endpoint {
        Some(endpoint) => {
            session.api.enabled = true;
            session.api.endpoint = endpoint.clone();
            session.api.auth_token = run.api_token.clone().unwrap_or_default();
        }
        None if run.api_token.is_some() => {
            warn!("--api-token has no effect without --api-endpoint");
        }
        None => {}
    }
}

pub(crate) fn test_session(args: &TestArgs, config: &ConsoleConfig) -> DeveloperSession {
    let mut session = DeveloperSession::with_defaults(&config.defaults);
    session.main_mode = MainMode::Run;
    session.sub_mode = SubMode::Test;
    session.usecase_id = args.usecase_id.clone().unwrap_or_default();
    session.query = args.query.clone().unwrap_or_default();
    apply_run_args(&mut session, &args.run);
    session
}

/// Submit the session and classify the latest result.
///
/// Only client-side validation failures are errors here; a failed backend
/// result comes back as a `Plain` view.
pub(crate) async fn submit_session<B: RagBackend>(
    backend: B,
    session: &DeveloperSession,
) -> anyhow::Result<ResponseView> {
    let mut controller = SubmissionController::new(backend);
    controller.submit(session).await?;
    Ok(controller.view())
}

/// Submit the session and print the rendered response.
///
/// A failed result is printed like any other, then returned as an error so
/// the process exits non-zero.
pub(crate) async fn submit_and_show<B: RagBackend>(
    backend: B,
    session: &DeveloperSession,
) -> anyhow::Result<ResponseView> {
    let view = submit_session(backend, session).await?;
    print!("{}", render_text(&view));
    if let ResponseView::Plain { result } = &view {
        if !result.success {
            anyhow::bail!("{}", result.message);
        }
    }
    Ok(view)
}

async fn handle_upload(args: UploadArgs, options: &GlobalOptions) -> anyhow::Result<()> {
    let config = load(options)?;
    let backend = backend_for(&config, args.use_case.as_deref())?;
    let session = upload_session(args, &config);
    submit_and_show(backend, &session).await?;
    Ok(())
}

async fn handle_test(args: TestArgs, options: &GlobalOptions) -> anyhow::Result<()> {
    let config = load(options)?;
    let backend = backend_for(&config, args.run.use_case.as_deref())?;
    let session = test_session(&args, &config);
    submit_and_show(backend, &session).await?;
    Ok(())
}

async fn handle_evaluate(args: EvaluateArgs, options: &GlobalOptions) -> anyhow::Result<()> {
    let config = load(options)?;
    let backend = backend_for(&config, args.run.use_case.as_deref())?;

    let mut session = DeveloperSession::with_defaults(&config.defaults);
    session.main_mode = MainMode::Run;
    session.sub_mode = SubMode::Evaluation;
    session.usecase_id = args.usecase_id.clone().unwrap_or_default();
    apply_run_args(&mut session, &args.run);

    let count = session.evaluation.load_file(&args.csv).await?;
    // Surface missing inputs before asking for confirmation.
    assemble(&session)?;

    if !options.quiet {
        println!("Loaded {count} test cases from {}", args.csv.display());
        for record in session.evaluation.preview(PREVIEW_ROWS) {
            println!("  Q: {}", record.query);
            println!("  A: {}", record.answer);
        }
        if count > PREVIEW_ROWS {
            println!("  ... and {} more", count - PREVIEW_ROWS);
        }
    }

    if !args.yes {
        let proceed = Confirm::new()
            .with_prompt(format!("Submit {count} queries for evaluation?"))
            .default(true)
            .interact()
            .unwrap_or(false);
        if !proceed {
            println!("Evaluation cancelled.");
            return Ok(());
        }
    }

    let view = submit_and_show(backend, &session).await?;
    let store = JobStore::for_workspace(&options.workspace);
    if let Some(reference) = remember_job(&store, &view)? {
        println!("\nCheck progress with: ragdesk status {reference}");
    }
    Ok(())
}

/// Save an async job so `status` and `download` can find its URLs later.
///
/// Returns the reference to pass to those commands.
pub(crate) fn remember_job(
    store: &JobStore,
    view: &ResponseView,
) -> anyhow::Result<Option<String>> {
    let ResponseView::AsyncJob(job) = view else {
        return Ok(None);
    };
    if let Some(path) = store.save(job)? {
        info!(path = %path.display(), "Saved evaluation job");
    }
    Ok(job
        .task_id
        .clone()
        .filter(|id| !id.is_empty())
        .or_else(|| job.status_url.clone()))
}

/// Look up a job by task id or status URL.
///
/// A status URL with no saved record is still usable; a bare task id is not.
pub(crate) fn find_job(
    store: &JobStore,
    reference: &str,
    download_url: Option<String>,
) -> anyhow::Result<JobTracker> {
    let mut job = match store.find(reference)? {
        Some(job) => job,
        None if reference.contains('/') => JobTracker::for_status_url(reference),
        None => anyhow::bail!(
            "No saved job with task id '{reference}' in {}; pass its status URL instead",
            store.dir().display()
        ),
    };
    if download_url.is_some() {
        job.download_url = download_url;
    }
    Ok(job)
}

/// Poll a job once, failing if the status request failed.
pub(crate) async fn refresh_job<B: RagBackend>(
    backend: &B,
    job: &mut JobTracker,
) -> anyhow::Result<()> {
    let result = job.refresh(backend).await;
    if !result.success {
        anyhow::bail!("{}", result.message);
    }
    Ok(())
}

async fn handle_status(reference: &str, options: &GlobalOptions) -> anyhow::Result<()> {
    let config = load(options)?;
    let backend = HttpBackend::new(&config.api)?;
    let store = JobStore::for_workspace(&options.workspace);
    let mut job = find_job(&store, reference, None)?;
    refresh_job(&backend, &mut job).await?;
    store.save(&job)?;
    print!("{}", render_text(&ResponseView::AsyncJob(job)));
    Ok(())
}

async fn handle_download(
    reference: &str,
    download_url: Option<String>,
    print: bool,
    options: &GlobalOptions,
) -> anyhow::Result<()> {
    let config = load(options)?;
    let backend = HttpBackend::new(&config.api)?;
    let store = JobStore::for_workspace(&options.workspace);
    let mut job = find_job(&store, reference, download_url)?;
    refresh_job(&backend, &mut job).await?;
    store.save(&job)?;

    let Some(link) = job.download_link() else {
        if job.status.is_completed() {
            anyhow::bail!("The job completed but no download URL is known; pass --download-url");
        }
        anyhow::bail!("Results are not ready yet (status: {})", job.status);
    };
    let link = backend.resolve_url(&link)?;

    if print {
        println!("{link}");
        return Ok(());
    }
    info!(link = %link, "Opening results in browser");
    open::that(&link).with_context(|| format!("Could not open {link}"))?;
    println!("Opened {link}");
    Ok(())
}

async fn handle_form(
    use_case: &str,
    assignments: &[String],
    options: &GlobalOptions,
) -> anyhow::Result<()> {
    let config = load(options)?;
    let use_case = UseCaseCatalog::new(config.use_cases_dir.clone()).load_or_generic(use_case)?;

    let mut state = FormState::new();
    for assignment in assignments {
        let (id, value) = FormState::parse_assignment(assignment)?;
        if !use_case.form_fields.iter().any(|f| f.id == id) {
            warn!(field = %id, "Field is not part of this form");
        }
        state.set_field(id, value);
    }

    let mut controller = SubmissionController::new(HttpBackend::new(&config.api)?);
    let result = match controller
        .submit_form(&use_case.api_endpoint, &use_case.form_fields, &mut state)
        .await
    {
        Ok(result) => result,
        Err(e) => {
            for (id, message) in state.errors() {
                eprintln!("  {id}: {message}");
            }
            return Err(e.into());
        }
    };

    if !result.success {
        anyhow::bail!("{}", result.message);
    }
    for (label, value) in render_fields(&result, &use_case.response_fields) {
        println!("{label}: {value}");
    }
    Ok(())
}

fn field_type_name(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Text => "text",
        FieldType::Number => "number",
        FieldType::Select => "select",
        FieldType::Textarea => "textarea",
    }
}

fn handle_catalog(use_case: Option<&str>, options: &GlobalOptions) -> anyhow::Result<()> {
    let config = load(options)?;
    let catalog = UseCaseCatalog::new(config.use_cases_dir.clone());

    let Some(name) = use_case else {
        println!("Use cases:");
        for (name, label) in UseCaseCatalog::builtins() {
            println!("  {name:<20} {label}");
        }
        if let Some(dir) = &config.use_cases_dir {
            println!("  (files in {} take precedence)", dir.display());
        }
        println!("\nTools:");
        for tool in AVAILABLE_TOOLS {
            println!("  {:<20} {}", tool.id, tool.description);
        }
        println!("\nAgents:");
        for agent in AVAILABLE_AGENTS {
            println!("  {:<20} {}", agent.id, agent.description);
        }
        return Ok(());
    };

    let use_case = catalog.load(name)?;
    println!("Use case: {name}");
    println!("  upload:   {}", use_case.endpoint_for(Operation::Upload));
    println!("  test:     {}", use_case.endpoint_for(Operation::Test));
    println!("  evaluate: {}", use_case.endpoint_for(Operation::Evaluate));
    println!("\nFields:");
    for field in &use_case.form_fields {
        let required = if field.required { " (required)" } else { "" };
        println!(
            "  {:<16} {:<9} {}{required}",
            field.id,
            field_type_name(field.field_type),
            field.label
        );
        if !field.options.is_empty() {
            println!("{:>29}{}", "one of: ", field.options.join(", "));
        }
    }
    println!("\nResponse fields:");
    for field in &use_case.response_fields {
        println!("  {:<16} {}", field.id, field.label);
    }
    Ok(())
}

fn handle_config(action: ConfigAction, options: &GlobalOptions) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = options.workspace.join(".ragdesk");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&ConsoleConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(options)?;
            if let Some(note) = defaults_note(options) {
                eprintln!("{note}");
            }
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

/// Note for `config show` when no configuration file contributes.
fn defaults_note(options: &GlobalOptions) -> Option<String> {
    if options.config_file.is_some() || config_exists(Some(&options.workspace)) {
        return None;
    }
    Some(
        "# No configuration file found; showing built-in defaults (run `ragdesk config init`)"
            .into(),
    )
}
