//! CLI tool for managing user accounts and their 2FA state
//!
//! # Usage
//!
//! ```bash
//! # Add a new user
//! auth-user add user@example.com password123 --db sqlite://auth.db
//!
//! # List all users with their 2FA state
//! auth-user list --db sqlite://auth.db
//!
//! # Turn 2FA off for a user who lost their authenticator
//! auth-user reset-2fa user@example.com --db sqlite://auth.db
//! ```

use clap::{Parser, Subcommand};
use auth_rs::store::{self, TwoFactorEvent, TwoFactorStore, UserStore};

#[derive(Parser)]
#[command(name = "auth-user")]
#[command(about = "Manage user accounts and 2FA enrolment", long_about = None)]
struct Cli {
    /// Database URL (e.g., sqlite://auth.db)
    #[arg(short, long, default_value = "sqlite://auth.db?mode=rwc")]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new user
    Add {
        /// User email address
        email: String,
        /// User password
        password: String,
    },
    /// Delete a user
    Delete {
        /// User email address
        email: String,
    },
    /// List all users
    List,
    /// Check if user exists
    Exists {
        /// User email address
        email: String,
    },
    /// Disable 2FA for a user
    #[command(name = "reset-2fa")]
    Reset2fa {
        /// User email address
        email: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let db = store::connect(&cli.db).await?;
    let users = UserStore::new(db.clone());
    let two_factor = TwoFactorStore::new(db);

    match cli.command {
        Commands::Add { email, password } => {
            println!("Adding user: {}", email);

            if users.find_by_email(&email).await?.is_some() {
                eprintln!("Error: User {} already exists", email);
                std::process::exit(1);
            }

            users.create(&email, &password).await?;
            println!("✓ User {} added successfully", email);
        }
        Commands::Delete { email } => {
            println!("Deleting user: {}", email);

            if !users.delete(&email).await? {
                eprintln!("Error: User {} does not exist", email);
                std::process::exit(1);
            }

            println!("✓ User {} deleted successfully", email);
        }
        Commands::List => {
            println!("Listing all users...\n");

            let all = users.list().await?;

            if all.is_empty() {
                println!("No users found.");
            } else {
                println!("{:<30} {:<6} {:<27} {:<27}", "Email", "2FA", "Created At", "Last Login");
                println!("{:-<92}", "");

                for user in &all {
                    let mfa = if two_factor.is_enabled(user.id).await? { "on" } else { "off" };
                    let last_login = user.last_login.as_deref().unwrap_or("Never");
                    println!(
                        "{:<30} {:<6} {:<27} {:<27}",
                        user.email, mfa, user.created_at, last_login
                    );
                }

                println!("\nTotal: {} user(s)", all.len());
            }
        }
        Commands::Exists { email } => {
            if users.find_by_email(&email).await?.is_some() {
                println!("✓ User {} exists", email);
            } else {
                println!("✗ User {} does not exist", email);
                std::process::exit(1);
            }
        }
        Commands::Reset2fa { email } => {
            let Some(user) = users.find_by_email(&email).await? else {
                eprintln!("Error: User {} does not exist", email);
                std::process::exit(1);
            };

            if two_factor.clear(user.id).await? {
                two_factor.record_event(user.id, TwoFactorEvent::Disabled).await?;
                println!("✓ 2FA disabled for {}", email);
            } else {
                println!("2FA was not enabled for {}", email);
            }
        }
    }

    Ok(())
}
