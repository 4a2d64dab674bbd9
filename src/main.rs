//! ebook-library server entry point.

use clap::Parser;
use ebook_library::{
    auth::AuthService,
    config::{CategoryCommand, Cli, Command, Config, UserCommand},
    db::Database,
    server,
    util::sanitize_input,
};
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    // Handle command
    match cli.command {
        Some(Command::Init { force }) => cmd_init(force),
        Some(Command::User { action }) => cmd_user(action, &config),
        Some(Command::Category { action }) => cmd_category(action, &config),
        Some(Command::Serve { bind }) => cmd_serve(config, bind).await,
        None => cmd_serve(config, None).await,
    }
}

/// Initialize config and database.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    let config = Config::default();
    let _db = Database::open(&config.database.path)?;
    println!("Initialized database: {}", config.database.path.display());

    println!("\nCreate an administrator with:");
    println!("  ebook-library user add <username> --email <email> --role admin");

    Ok(())
}

/// User management commands.
fn cmd_user(action: UserCommand, config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let auth = AuthService::new(
        db,
        config.auth.session_days,
        config.auth.registration_enabled(),
    );

    match action {
        UserCommand::Add {
            username,
            email,
            password,
            first_name,
            last_name,
            role,
        } => {
            let password = match password {
                Some(p) => p,
                None => prompt_password("Password: ")?,
            };

            let user = auth.create_user(
                &sanitize_input(&username),
                &sanitize_input(&email),
                &password,
                &sanitize_input(&first_name),
                &sanitize_input(&last_name),
                &role,
            )?;
            println!(
                "Created user: {} (role: {}, id: {})",
                user.username, user.role, user.id
            );
        }

        UserCommand::List => {
            let users = auth.list_users()?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!("{:<6} {:<20} {:<8} {:<32} CREATED", "ID", "USERNAME", "ROLE", "EMAIL");
                println!("{}", "-".repeat(84));
                for user in users {
                    let created = ebook_library::db::timestamp_to_datetime(user.created_at)
                        .format("%Y-%m-%d %H:%M");
                    println!(
                        "{:<6} {:<20} {:<8} {:<32} {}",
                        user.id, user.username, user.role, user.email, created
                    );
                }
            }
        }

        UserCommand::Passwd { username, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt_password("New password: ")?,
            };

            if auth.change_password(&username, &password)? {
                println!("Password changed for: {}", username);
            } else {
                println!("User not found: {}", username);
            }
        }
    }

    Ok(())
}

/// Category management commands.
fn cmd_category(action: CategoryCommand, config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;

    match action {
        CategoryCommand::Add { name, description } => {
            let name = sanitize_input(&name);
            if name.is_empty() {
                anyhow::bail!("Category name is required");
            }

            let id = db.create_category(&name, &sanitize_input(&description))?;
            println!("Added category: {} (id: {})", name, id);
        }

        CategoryCommand::List => {
            let categories = db.list_categories()?;
            if categories.is_empty() {
                println!("No categories found.");
            } else {
                println!("{:<6} {:<30} BOOKS", "ID", "NAME");
                println!("{}", "-".repeat(44));
                for category in categories {
                    println!(
                        "{:<6} {:<30} {}",
                        category.id, category.name, category.book_count
                    );
                }
            }
        }
    }

    Ok(())
}

/// Start the server.
async fn cmd_serve(mut config: Config, bind: Option<std::net::SocketAddr>) -> anyhow::Result<()> {
    // Override bind address if specified
    if let Some(addr) = bind {
        config.server.bind = addr;
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ebook_library=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = Database::open(&config.database.path)?;

    let expired = db.cleanup_expired_sessions()?;
    if expired > 0 {
        tracing::info!(sessions = expired, "Removed expired sessions");
    }

    tracing::info!(
        bind = %config.server.bind,
        database = %config.database.path.display(),
        registration = %config.auth.registration,
        "Starting ebook-library server"
    );

    let bind_addr = config.server.bind;
    let state = server::AppState::new(config, db);
    let app = server::create_router(state);

    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(address = %bind_addr, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Prompt for password input.
fn prompt_password(prompt: &str) -> anyhow::Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut password = String::new();
    io::stdin().read_line(&mut password)?;

    Ok(password.trim().to_string())
}
