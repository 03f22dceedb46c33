//! Command-line interface for Bandwise.
//!
//! Without a subcommand the REST backend is started (handled in main.rs).
//! Every other subcommand works directly on the configured storage:
//! - `band <pct>` - Convert a practice percentage to a band score
//! - `progress ...` - Study sessions, skill scores and the target band
//! - `registrations ...`, `events ...`, `users ...` - Admin views
//! - `login`, `register`, `logout`, `whoami`, `oauth` - Mock authentication
//! - `db ...` - Database connection settings
//! - `export <path>` - Write the source download archive

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::admin::{
    EventsView, RegistrationFilter, RegistrationsView, StatusFilter, UserFilter, UsersView,
};
use crate::api::ApiClient;
use crate::config::Config;
use crate::error::{Error, Notification};
use crate::export;
use crate::models::{
    EventRegistration, LoginRequest, NewEvent, OAuthProvider, RegisterRequest, Role, User,
};
use crate::progress::{NewActivity, NewStudySession, ProgressStore};
use crate::scoring::{percentage_to_band, BandScore, Skill};
use crate::services::{AuthService, DatabaseDriver, DatabaseSettings, OAuthService};
use crate::storage::Storage;

/// Progress owner used when nobody is logged in
const GUEST_USER: &str = "guest";

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "bandwise")]
#[command(author, version, about = "IELTS preparation tracker with a mock REST backend", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "bandwise.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Keep all data in memory for this run only
    #[arg(long)]
    pub ephemeral: bool,

    /// Whose progress to work on (defaults to the logged-in user)
    #[arg(long, env = "BANDWISE_USER")]
    pub user: Option<String>,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the REST backend
    Serve,

    /// Convert a practice test percentage to a band score
    Band {
        /// Percentage of correct answers
        percentage: f64,
    },

    /// Study progress commands
    #[command(subcommand)]
    Progress(ProgressCommands),

    /// Event registration management
    #[command(subcommand)]
    Registrations(RegistrationCommands),

    /// Event management
    #[command(subcommand)]
    Events(EventCommands),

    /// User management
    #[command(subcommand)]
    Users(UserCommands),

    /// Sign in with email and password
    Login {
        email: String,
        #[arg(long, env = "BANDWISE_PASSWORD")]
        password: String,
        /// Sign in against the REST backend instead of locally
        #[arg(long)]
        remote: bool,
    },

    /// Create an account
    Register {
        name: String,
        email: String,
        #[arg(long, env = "BANDWISE_PASSWORD")]
        password: String,
        #[arg(long, default_value = "student")]
        role: Role,
        #[arg(long)]
        remote: bool,
    },

    /// Sign out and forget the stored token
    Logout {
        #[arg(long)]
        remote: bool,
    },

    /// Show the logged-in user
    Whoami {
        #[arg(long)]
        remote: bool,
    },

    /// Sign in with a (simulated) OAuth provider
    Oauth {
        /// google, facebook or apple
        provider: OAuthProvider,
    },

    /// Database connection settings
    #[command(subcommand)]
    Db(DbCommands),

    /// Write the source download archive
    Export {
        /// Destination zip file
        #[arg(default_value = "ielts-prep-source.zip")]
        path: PathBuf,
    },
}

/// Progress subcommands
#[derive(Subcommand, Debug)]
pub enum ProgressCommands {
    /// Show scores, sessions, recent activity and achievements
    Show,
    /// Schedule a study session
    AddSession {
        /// Day of the week, e.g. Monday
        day: String,
        /// Focus area, e.g. "Writing Task 2"
        focus: String,
        /// Duration, e.g. "1.5 hours"
        time: String,
    },
    /// Mark a study session complete
    CompleteSession { id: String },
    /// Remove a study session
    DeleteSession { id: String },
    /// Set a skill score directly
    Score { skill: Skill, band: BandScore },
    /// Record a practice test result as a percentage
    Practice { skill: Skill, percentage: f64 },
    /// Set the target band
    Target { band: BandScore },
    /// Add a note to the activity log
    Note {
        skill: Skill,
        label: String,
        #[arg(default_value = "")]
        result: String,
    },
    /// Unlock an achievement by id
    Unlock { id: String },
}

/// Registration subcommands
#[derive(Subcommand, Debug)]
pub enum RegistrationCommands {
    /// List registrations
    List {
        /// Match user name, email or event title
        #[arg(short, long, default_value = "")]
        search: String,
        /// all, confirmed, pending or canceled
        #[arg(long, default_value = "all")]
        status: StatusFilter,
    },
    /// Register the logged-in user for an event
    Join { event_id: String },
    Confirm { user_id: String, event_id: String },
    Cancel { user_id: String, event_id: String },
    Delete { user_id: String, event_id: String },
}

/// Event subcommands
#[derive(Subcommand, Debug)]
pub enum EventCommands {
    List,
    Add {
        title: String,
        date: String,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    Delete { id: String },
}

/// User subcommands
#[derive(Subcommand, Debug)]
pub enum UserCommands {
    List {
        #[arg(short, long, default_value = "")]
        search: String,
        #[arg(long)]
        role: Option<Role>,
    },
    /// Change a user's role
    Role { user_id: String, role: Role },
    Delete { user_id: String },
}

/// Database subcommands
#[derive(Subcommand, Debug)]
pub enum DbCommands {
    /// Show the stored settings and the matching .env lines
    Show,
    /// Update the stored settings
    Set {
        #[arg(long)]
        driver: Option<DatabaseDriver>,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        database: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long, env = "BANDWISE_DB_PASSWORD")]
        password: Option<String>,
    },
    /// Test the stored settings
    Test,
    /// Restore the default settings
    Reset,
}

/// Shared handles for one CLI invocation
pub struct Context {
    pub config: Config,
    pub storage: Storage,
    pub user: Option<String>,
}

impl Context {
    fn auth(&self) -> AuthService {
        AuthService::new(self.storage.clone(), self.config.mock.auth_delay())
    }

    fn client(&self) -> Result<ApiClient> {
        Ok(ApiClient::new(
            self.config.api.base_url.clone(),
            self.storage.clone(),
        )?)
    }

    fn user_id(&self) -> Result<String> {
        if let Some(user) = &self.user {
            return Ok(user.clone());
        }
        Ok(self
            .auth()
            .current_user()?
            .map(|u| u.id)
            .unwrap_or_else(|| GUEST_USER.to_string()))
    }

    fn progress(&self) -> Result<ProgressStore> {
        let user_id = self.user_id()?;
        Ok(ProgressStore::open(
            self.storage.clone(),
            &user_id,
            &self.config.progress,
        )?)
    }
}

/// Run a CLI command
pub async fn run_command(cli: &Cli, config: Config) -> Result<()> {
    let Some(command) = &cli.command else {
        // No subcommand means start the server - this is handled in main.rs
        return Ok(());
    };
    let storage = crate::open_storage(&config.storage, cli.ephemeral)
        .context("Failed to open storage")?;
    let ctx = Context {
        config,
        storage,
        user: cli.user.clone(),
    };
    dispatch(&ctx, command).await
}

pub async fn dispatch(ctx: &Context, command: &Commands) -> Result<()> {
    match command {
        Commands::Serve => Ok(()),
        Commands::Band { percentage } => {
            println!("{:.0}% => Band {}", percentage, percentage_to_band(*percentage));
            Ok(())
        }
        Commands::Progress(cmd) => cmd_progress(ctx, cmd),
        Commands::Registrations(cmd) => cmd_registrations(ctx, cmd),
        Commands::Events(cmd) => cmd_events(ctx, cmd),
        Commands::Users(cmd) => cmd_users(ctx, cmd),
        Commands::Login {
            email,
            password,
            remote,
        } => cmd_login(ctx, email, password, *remote).await,
        Commands::Register {
            name,
            email,
            password,
            role,
            remote,
        } => {
            let request = RegisterRequest {
                name: name.clone(),
                email: email.clone(),
                password: password.clone(),
                password_confirmation: password.clone(),
                role: Some(*role),
            };
            cmd_register(ctx, request, *remote).await
        }
        Commands::Logout { remote } => {
            if *remote {
                ctx.client()?.logout().await?;
            } else {
                ctx.auth().logout().await?;
            }
            print_notification(&Notification::success("Signed out", "See you next time"));
            Ok(())
        }
        Commands::Whoami { remote } => {
            let user = if *remote {
                Some(ctx.client()?.user().await?)
            } else {
                ctx.auth().current_user()?
            };
            match user {
                Some(user) => print_user(&user),
                None => println!("Not logged in."),
            }
            Ok(())
        }
        Commands::Oauth { provider } => cmd_oauth(ctx, *provider).await,
        Commands::Db(cmd) => cmd_db(ctx, cmd).await,
        Commands::Export { path } => {
            export::write_source_archive_to(path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("[OK] Wrote {}", path.display());
            for entry in export::archive_entries() {
                println!("  {}", entry);
            }
            Ok(())
        }
    }
}

// ============================================================================
// Progress
// ============================================================================

fn cmd_progress(ctx: &Context, cmd: &ProgressCommands) -> Result<()> {
    let mut progress = ctx.progress()?;
    match cmd {
        ProgressCommands::Show => print_progress(&progress),
        ProgressCommands::AddSession { day, focus, time } => {
            let session = progress.add_study_session(NewStudySession {
                date: day.clone(),
                focus: focus.clone(),
                time: time.clone(),
            })?;
            print_notification(&Notification::success(
                "Study session added",
                format!("{} on {} ({})", session.focus, session.date, session.id),
            ));
        }
        ProgressCommands::CompleteSession { id } => {
            progress.complete_study_session(id)?;
            print_notification(&Notification::success("Session complete", "Keep it up!"));
        }
        ProgressCommands::DeleteSession { id } => {
            progress.delete_study_session(id)?;
            print_notification(&Notification::info("Session removed", id.clone()));
        }
        ProgressCommands::Score { skill, band } => {
            progress.update_skill_score(*skill, *band)?;
            println!(
                "{} set to {}; overall band {:.1}",
                skill,
                band,
                progress.data().current_band
            );
        }
        ProgressCommands::Practice { skill, percentage } => {
            let band = progress.record_practice_result(*skill, *percentage)?;
            print_notification(&Notification::success(
                "Practice recorded",
                format!("{} {:.0}% => Band {}", skill, percentage, band),
            ));
        }
        ProgressCommands::Target { band } => {
            progress.set_target_band(*band)?;
            println!("Target band set to {}", band);
        }
        ProgressCommands::Note {
            skill,
            label,
            result,
        } => {
            progress.add_activity(NewActivity::for_skill(*skill, label.clone(), result.clone()))?;
            println!("Added to activity log.");
        }
        ProgressCommands::Unlock { id } => {
            if progress.unlock_achievement(id)? {
                print_notification(&Notification::success("Achievement unlocked", id.clone()));
            } else {
                println!("Achievement '{}' was already unlocked.", id);
            }
        }
    }
    Ok(())
}

fn print_progress(progress: &ProgressStore) {
    let data = progress.data();

    println!();
    println!("=== Study Progress ===");
    println!();
    println!("Overall band: {:.1}", data.current_band);
    println!("Target band:  {}", data.target_band);
    println!();
    println!("Skills:");
    for skill in Skill::ALL {
        println!("  {:<10} {}", skill.to_string(), data.skill_scores.get(skill));
    }

    println!();
    println!(
        "Study sessions ({}/{} complete, {:.0}%):",
        data.completed_sessions(),
        data.study_sessions.len(),
        progress.completion_rate() * 100.0
    );
    if data.study_sessions.is_empty() {
        println!("  No sessions scheduled.");
    }
    for session in progress.sessions() {
        let mark = if session.complete { "[x]" } else { "[ ]" };
        println!(
            "  {} {:<36}  {:<10}  {:<24}  {}",
            mark,
            session.id,
            session.date,
            truncate(&session.focus, 24),
            session.time
        );
    }

    println!();
    println!("Recent activity:");
    if data.activities.is_empty() {
        println!("  Nothing yet.");
    }
    for activity in progress.activities().iter().take(10) {
        println!(
            "  {}  {:<32}  {}",
            activity.timestamp.format("%Y-%m-%d %H:%M"),
            truncate(&activity.label, 32),
            activity.result
        );
    }

    println!();
    println!("Achievements:");
    for achievement in &data.achievements {
        let mark = if achievement.is_unlocked() { "[OK]" } else { "[  ]" };
        println!(
            "  {} {:<20} {}",
            mark, achievement.title, achievement.description
        );
    }
    println!();
}

// ============================================================================
// Admin views
// ============================================================================

fn cmd_registrations(ctx: &Context, cmd: &RegistrationCommands) -> Result<()> {
    let view = RegistrationsView::new(ctx.storage.clone());
    match cmd {
        RegistrationCommands::List { search, status } => {
            let rows = view.filtered(&RegistrationFilter {
                search: search.clone(),
                status: *status,
            })?;
            let counts = view.counts()?;
            println!(
                "Total: {}  Confirmed: {}  Pending: {}  Canceled: {}",
                counts.total, counts.confirmed, counts.pending, counts.canceled
            );
            if rows.is_empty() {
                println!("No registrations found.");
                return Ok(());
            }
            println!();
            println!(
                "{:<36}  {:<20}  {:<28}  {:<24}  {:<10}",
                "USER ID", "NAME", "EMAIL", "EVENT", "STATUS"
            );
            println!("{}", "-".repeat(126));
            for row in rows {
                let r = &row.registration;
                println!(
                    "{:<36}  {:<20}  {:<28}  {:<24}  {:<10}",
                    r.user_id,
                    truncate(&r.user_name, 20),
                    truncate(&r.user_email, 28),
                    truncate(&row.event_title, 24),
                    r.status
                );
            }
            println!();
        }
        RegistrationCommands::Join { event_id } => {
            let user = ctx
                .auth()
                .current_user()?
                .ok_or_else(|| Error::Unauthorized("Log in to register for events".to_string()))?;
            let registration = view.register(&user, event_id)?;
            print_notification(&Notification::success(
                "Registration received",
                format!("Status: {}", registration.status),
            ));
        }
        RegistrationCommands::Confirm { user_id, event_id } => {
            print_status_change(view.confirm(user_id, event_id)?, user_id, event_id);
        }
        RegistrationCommands::Cancel { user_id, event_id } => {
            print_status_change(view.cancel(user_id, event_id)?, user_id, event_id);
        }
        RegistrationCommands::Delete { user_id, event_id } => {
            let remaining = view.delete(user_id, event_id)?;
            print_notification(&Notification::info(
                "Registration deleted",
                format!("{} registrations remain", remaining.len()),
            ));
        }
    }
    Ok(())
}

fn print_status_change(registrations: Vec<EventRegistration>, user_id: &str, event_id: &str) {
    if let Some(r) = registrations.iter().find(|r| r.matches(user_id, event_id)) {
        print_notification(&Notification::success(
            "Registration updated",
            format!("{} is now {}", r.user_name, r.status),
        ));
    }
}

fn cmd_events(ctx: &Context, cmd: &EventCommands) -> Result<()> {
    let view = EventsView::new(ctx.storage.clone());
    match cmd {
        EventCommands::List => {
            let events = view.list()?;
            if events.is_empty() {
                println!("No events found.");
                return Ok(());
            }
            println!();
            println!("{:<36}  {:<30}  {:<16}  {:<20}", "ID", "TITLE", "DATE", "LOCATION");
            println!("{}", "-".repeat(108));
            for event in events {
                println!(
                    "{:<36}  {:<30}  {:<16}  {:<20}",
                    event.id,
                    truncate(&event.title, 30),
                    truncate(&event.date, 16),
                    truncate(&event.location, 20)
                );
            }
            println!();
        }
        EventCommands::Add {
            title,
            date,
            location,
            description,
        } => {
            let event = view.create(NewEvent {
                title: title.clone(),
                date: date.clone(),
                location: location.clone(),
                description: description.clone(),
            })?;
            print_notification(&Notification::success("Event created", event.id));
        }
        EventCommands::Delete { id } => {
            view.delete(id)?;
            print_notification(&Notification::info("Event deleted", id.clone()));
        }
    }
    Ok(())
}

fn cmd_users(ctx: &Context, cmd: &UserCommands) -> Result<()> {
    let view = UsersView::new(ctx.storage.clone());
    match cmd {
        UserCommands::List { search, role } => {
            let users = view.filtered(&UserFilter {
                search: search.clone(),
                role: *role,
            })?;
            if users.is_empty() {
                println!("No users found.");
                return Ok(());
            }
            println!();
            println!("{:<36}  {:<24}  {:<30}  {:<8}", "ID", "NAME", "EMAIL", "ROLE");
            println!("{}", "-".repeat(104));
            for user in users {
                println!(
                    "{:<36}  {:<24}  {:<30}  {:<8}",
                    user.id,
                    truncate(&user.name, 24),
                    truncate(&user.email, 30),
                    user.role
                );
            }
            println!();
        }
        UserCommands::Role { user_id, role } => {
            let user = view.set_role(user_id, *role)?;
            print_notification(&Notification::success(
                "Role updated",
                format!("{} is now a {}", user.name, user.role),
            ));
        }
        UserCommands::Delete { user_id } => {
            view.delete(user_id)?;
            print_notification(&Notification::info("User deleted", user_id.clone()));
        }
    }
    Ok(())
}

// ============================================================================
// Authentication
// ============================================================================

async fn cmd_login(ctx: &Context, email: &str, password: &str, remote: bool) -> Result<()> {
    let request = LoginRequest {
        email: email.to_string(),
        password: password.to_string(),
    };
    let response = if remote {
        ctx.client()?.login(&request).await?
    } else {
        ctx.auth().login(request).await?
    };
    print_notification(&Notification::success(
        "Welcome back",
        format!("Signed in as {}", response.user.name),
    ));
    Ok(())
}

async fn cmd_register(ctx: &Context, request: RegisterRequest, remote: bool) -> Result<()> {
    let response = if remote {
        ctx.client()?.register(&request).await?
    } else {
        ctx.auth().register(request).await?
    };
    print_notification(&Notification::success(
        "Account created",
        format!("Welcome, {}", response.user.name),
    ));
    Ok(())
}

async fn cmd_oauth(ctx: &Context, provider: OAuthProvider) -> Result<()> {
    println!("Connecting to {}...", provider);
    let profile = OAuthService::new(ctx.config.mock.oauth_delay())
        .mock_login(provider)
        .await;
    let response = ctx.auth().complete_oauth(profile).await?;
    print_notification(&Notification::success(
        "Signed in",
        format!("{} via {}", response.user.email, provider),
    ));
    Ok(())
}

fn print_user(user: &User) {
    println!("ID:       {}", user.id);
    println!("Name:     {}", user.name);
    println!("Email:    {}", user.email);
    println!("Role:     {}", user.role);
    if let Some(provider) = user.provider {
        println!("Provider: {}", provider);
    }
    if let Some(target) = user.target_band {
        println!("Target:   {}", target);
    }
}

// ============================================================================
// Database settings
// ============================================================================

async fn cmd_db(ctx: &Context, cmd: &DbCommands) -> Result<()> {
    let settings = DatabaseSettings::new(ctx.storage.clone(), ctx.config.mock.connection_delay());
    match cmd {
        DbCommands::Show => {
            let config = settings.load()?;
            let status = if config.connected { "[OK] connected" } else { "[--] not tested" };
            println!("Driver:   {}", config.driver.label());
            println!("Host:     {}:{}", config.host, config.port);
            println!("Database: {}", config.database);
            println!("Username: {}", config.username);
            println!("Status:   {}", status);
            if let Some(at) = config.last_connected {
                println!("Last OK:  {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            println!();
            for (name, value) in config.env_vars() {
                let value = if name == "DB_PASSWORD" && !value.is_empty() {
                    "********".to_string()
                } else {
                    value
                };
                println!("{}={}", name, value);
            }
        }
        DbCommands::Set {
            driver,
            host,
            port,
            database,
            username,
            password,
        } => {
            let mut config = settings.load()?;
            if let Some(driver) = driver {
                if config.port == config.driver.default_port() && port.is_none() {
                    config.port = driver.default_port();
                }
                config.driver = *driver;
            }
            if let Some(host) = host {
                config.host = host.clone();
            }
            if let Some(port) = port {
                config.port = *port;
            }
            if let Some(database) = database {
                config.database = database.clone();
            }
            if let Some(username) = username {
                config.username = username.clone();
            }
            if let Some(password) = password {
                config.password = password.clone();
            }
            let saved = settings.save(&config)?;
            print_notification(&Notification::success(
                "Settings saved",
                format!("{} at {}:{}", saved.driver.label(), saved.host, saved.port),
            ));
        }
        DbCommands::Test => {
            let config = settings.load()?;
            println!("Testing connection...");
            let report = settings.test_connection(&config).await?;
            let note = if report.success {
                Notification::success("Connection successful", report.message)
            } else {
                Notification::error("Connection failed", report.message)
            };
            print_notification(&note);
        }
        DbCommands::Reset => {
            settings.reset()?;
            print_notification(&Notification::info("Settings reset", "Defaults restored"));
        }
    }
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Print a notification with its kind as a prefix
pub fn print_notification(note: &Notification) {
    let tag = match note.kind {
        crate::error::NotificationKind::Success => "[OK]",
        crate::error::NotificationKind::Info => "[i]",
        crate::error::NotificationKind::Error => "[!!]",
    };
    println!("{} {}", tag, note);
}

/// Print a failed command, listing field errors one per line
pub fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<Error>() {
        Some(e) => {
            let note = e.notification();
            eprintln!("[!!] {}", note);
            if let Error::Validation(errors) = e {
                if errors.len() > 1 {
                    for (field, messages) in errors.iter() {
                        for message in messages {
                            eprintln!("     {}: {}", field, message);
                        }
                    }
                }
            }
        }
        None => eprintln!("Error: {:#}", err),
    }
}

/// Truncate a string to max length with ellipsis
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
