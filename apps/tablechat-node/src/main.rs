use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tablechat::{
    group_local, ChatConfig, ChatService, ConversationMessage, PersistenceConfig, Reservation,
    ReservationDirectory, ReservationStatus, Restaurant, RestaurantDirectory, SenderRole,
    EMPTY_TRANSCRIPT_NOTICE,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Tablechat - reservation conversations from the terminal
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SQLite database file
    #[arg(long, default_value = "tablechat.db")]
    db: PathBuf,

    /// Pooled database connections
    #[arg(long, default_value = "5")]
    max_connections: u32,

    /// How often `watch` checks the database for messages from other clients (ms)
    #[arg(long, default_value = "500")]
    poll_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Get or create the conversation for a reservation
    Open {
        #[arg(long)]
        user: String,
        #[arg(long)]
        restaurant: String,
        #[arg(long)]
        reservation: String,
    },
    /// Send a message
    Send {
        #[arg(short, long)]
        conversation: String,
        #[arg(long)]
        sender: String,
        #[arg(long, value_enum, default_value = "user")]
        role: RoleArg,
        text: String,
    },
    /// Mark messages as read
    Read {
        #[arg(short, long)]
        conversation: String,
        ids: Vec<String>,
    },
    /// Print the transcript grouped by day
    Show {
        #[arg(short, long)]
        conversation: String,
    },
    /// Print the transcript and keep it updated until Ctrl+C
    Watch {
        #[arg(short, long)]
        conversation: String,
    },
    /// List a guest's conversations, most recent first
    List {
        #[arg(long)]
        user: String,
        /// JSON file with reservations and restaurants for display labels
        #[arg(long)]
        directory: Option<PathBuf>,
    },
    /// List a guest's reservations from a directory file
    Reservations {
        #[arg(long)]
        user: String,
        #[arg(long)]
        directory: PathBuf,
    },
    /// Apply a reservation status change
    Status {
        #[arg(long)]
        reservation: String,
        #[arg(long, value_enum)]
        status: StatusArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    User,
    Restaurant,
    Admin,
}

impl From<RoleArg> for SenderRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::User => SenderRole::User,
            RoleArg::Restaurant => SenderRole::Restaurant,
            RoleArg::Admin => SenderRole::Admin,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl From<StatusArg> for ReservationStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Pending => ReservationStatus::Pending,
            StatusArg::Confirmed => ReservationStatus::Confirmed,
            StatusArg::Completed => ReservationStatus::Completed,
            StatusArg::Cancelled => ReservationStatus::Cancelled,
        }
    }
}

/// Reservation and restaurant read-models loaded from a JSON file
#[derive(Debug, Default, Deserialize)]
struct FileDirectory {
    #[serde(default)]
    reservations: Vec<Reservation>,
    #[serde(default)]
    restaurants: Vec<Restaurant>,
}

impl FileDirectory {
    fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read directory file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid directory file {}", path.display()))
    }
}

#[async_trait]
impl ReservationDirectory for FileDirectory {
    async fn get_reservation(&self, id: &str) -> anyhow::Result<Option<Reservation>> {
        Ok(self.reservations.iter().find(|r| r.id == id).cloned())
    }

    async fn list_reservations_for_user(&self, user_id: &str) -> anyhow::Result<Vec<Reservation>> {
        Ok(self
            .reservations
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RestaurantDirectory for FileDirectory {
    async fn get_restaurant(&self, id: &str) -> anyhow::Result<Option<Restaurant>> {
        Ok(self.restaurants.iter().find(|r| r.id == id).cloned())
    }
}

fn print_transcript(messages: &[ConversationMessage]) {
    if messages.is_empty() {
        println!("  {}", EMPTY_TRANSCRIPT_NOTICE);
        return;
    }
    for group in group_local(messages) {
        println!("── {} ──", group.label);
        for message in group.messages {
            let read_mark = if message.is_read { "✓" } else { " " };
            println!(
                "  {} [{}] {} ({}): {}",
                read_mark,
                message.created_at.with_timezone(&Local).format("%H:%M"),
                message.sender_id,
                message.sender_role,
                message.text
            );
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();

    let config = ChatConfig {
        persistence: PersistenceConfig {
            db_path: args.db.clone(),
            max_connections: args.max_connections,
        },
        poll_interval: Duration::from_millis(args.poll_ms),
        ..Default::default()
    };
    let service = ChatService::open(&config)
        .await
        .context("Failed to open conversation database")?;
    debug!("Database ready at {}", args.db.display());

    match args.command {
        Command::Open {
            user,
            restaurant,
            reservation,
        } => {
            let id = service
                .get_or_create_conversation(&user, &restaurant, &reservation)
                .await?;
            println!("{}", id);
        }
        Command::Send {
            conversation,
            sender,
            role,
            text,
        } => {
            let message = service
                .send_message(&conversation, &sender, role.into(), &text)
                .await?;
            println!("Sent {}", message.id);
        }
        Command::Read { conversation, ids } => {
            let changed = service.mark_messages_as_read(&conversation, &ids).await?;
            println!("Marked {} message(s) as read", changed);
        }
        Command::Show { conversation } => {
            let messages = service.list_messages(&conversation).await?;
            print_transcript(&messages);
        }
        Command::Watch { conversation } => {
            let subscription = service
                .subscribe_messages(&conversation, |update| match update {
                    Ok(messages) => {
                        println!();
                        print_transcript(&messages);
                    }
                    Err(e) => warn!("Transcript refresh failed: {}", e),
                })
                .await?;
            info!("Watching conversation {}, press Ctrl+C to stop", conversation);

            tokio::signal::ctrl_c().await?;
            subscription.unsubscribe();
            println!("\n👋 Goodbye!");
        }
        Command::List { user, directory } => match directory {
            Some(path) => {
                let directory = Arc::new(FileDirectory::load(&path)?);
                let enricher = service.enricher(directory.clone(), directory);
                let conversations = service.list_conversations(&user).await?;
                for view in enricher.enrich(conversations, &user).await {
                    println!(
                        "{}  {}  {} {}  unread:{}  {}{}",
                        view.conversation.id,
                        view.restaurant_name,
                        view.reservation_date.as_deref().unwrap_or("-"),
                        view.reservation_time.as_deref().unwrap_or("-"),
                        view.unread_count,
                        view.conversation.last_message,
                        if view.conversation.is_active { "" } else { "  (closed)" }
                    );
                }
            }
            None => {
                for conversation in service.list_conversations(&user).await? {
                    println!(
                        "{}  reservation:{}  {}{}",
                        conversation.id,
                        conversation.reservation_id,
                        conversation.last_message,
                        if conversation.is_active { "" } else { "  (closed)" }
                    );
                }
            }
        },
        Command::Reservations { user, directory } => {
            let directory = FileDirectory::load(&directory)?;
            for reservation in directory.list_reservations_for_user(&user).await? {
                println!(
                    "{}  {}  {} {}  {:?}",
                    reservation.id,
                    reservation.restaurant_name.as_deref().unwrap_or(&reservation.restaurant_id),
                    reservation.date,
                    reservation.time,
                    reservation.status
                );
            }
        }
        Command::Status {
            reservation,
            status,
        } => {
            if service
                .apply_reservation_status(&reservation, status.into())
                .await?
            {
                println!("Conversation for reservation {} closed", reservation);
            } else {
                println!("No change");
            }
        }
    }

    Ok(())
}
