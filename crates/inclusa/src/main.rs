//! Inclusa: community platform client
//!
//! Main binary with subcommands for the forum, courses, jobs, chat and XP.
//! Each run builds a fresh [`Store`] against the configured backend; pass a
//! token from `inclusa login` (or `INCLUSA_TOKEN`) to stay signed in.

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inclusa::Store;
use inclusa_api::{
    ApiClient, ClientConfig, CourseFilters, DEFAULT_API_URL, JobFilters, NewPost, PostFilters,
    ProfileUpdate, RegisterRequest, UserFilters,
};
use inclusa_sync::SyncConfig;

mod commands;

#[derive(Parser)]
#[command(name = "inclusa")]
#[command(about = "Inclusa community platform client", long_about = None)]
struct Cli {
    /// Backend base URL
    #[arg(long, global = true, env = "INCLUSA_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Bearer token from a previous login
    #[arg(long, global = true, env = "INCLUSA_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Account email, used to log in when no token is given
    #[arg(long, global = true, env = "INCLUSA_EMAIL")]
    email: Option<String>,

    /// Account password
    #[arg(long, global = true, env = "INCLUSA_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and print a token to reuse
    Login,

    /// Create an account
    Register {
        #[arg(long)]
        name: String,

        /// State (UF)
        #[arg(long)]
        state: Option<String>,

        #[arg(long)]
        city: Option<String>,

        #[arg(long)]
        cep: Option<String>,

        #[arg(long)]
        bio: Option<String>,

        /// Vulnerability group ids (repeatable, see `groups`)
        #[arg(long = "group")]
        groups: Vec<i64>,
    },

    /// Show the signed-in user's profile and statistics
    Me,

    /// Update the signed-in user's profile
    Profile {
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        state: Option<String>,

        #[arg(long)]
        city: Option<String>,

        #[arg(long)]
        cep: Option<String>,

        #[arg(long)]
        bio: Option<String>,

        /// Replace the vulnerability groups (repeatable)
        #[arg(long = "group")]
        groups: Option<Vec<i64>>,

        /// Remove the profile photo
        #[arg(long)]
        remove_photo: bool,
    },

    /// List users
    Users {
        #[arg(long)]
        state: Option<String>,

        #[arg(long)]
        city: Option<String>,

        #[arg(long, default_value = "20")]
        limit: u32,

        #[arg(long, default_value = "0")]
        offset: u32,

        /// List the states and cities users live in instead
        #[arg(long)]
        locations: bool,
    },

    /// List vulnerability groups
    Groups,

    /// Show the forum feed
    Feed {
        #[arg(long)]
        category: Option<String>,

        /// Only posts by this user
        #[arg(long)]
        author: Option<i64>,

        #[arg(long, default_value = "20")]
        limit: u32,

        #[arg(long, default_value = "0")]
        offset: u32,
    },

    /// Show a post and its comments
    Show { post_id: i64 },

    /// Publish a post
    Post {
        title: String,

        content: String,

        #[arg(long)]
        category: Option<String>,
    },

    /// Delete one of your posts
    DeletePost { post_id: i64 },

    /// Comment on a post
    Comment { post_id: i64, content: String },

    /// Like or unlike a post
    Like { post_id: i64 },

    /// Like or unlike a comment
    CommentLike { post_id: i64, comment_id: i64 },

    /// List courses
    Courses {
        #[arg(long, default_value = "20")]
        limit: u32,

        #[arg(long, default_value = "0")]
        offset: u32,

        /// List course areas instead
        #[arg(long)]
        areas: bool,
    },

    /// Search job openings
    Jobs {
        /// Role or field, e.g. "desenvolvedor"
        #[arg(long)]
        field: Option<String>,

        #[arg(long)]
        location: Option<String>,

        #[arg(long)]
        page: Option<u32>,

        #[arg(long)]
        job_type: Option<String>,

        #[arg(long)]
        experience_level: Option<String>,

        #[arg(long)]
        work_type: Option<String>,
    },

    /// Show XP, level and titles
    Progress {
        /// Also list this many recent XP events
        #[arg(long, default_value = "0")]
        history: u32,
    },

    /// Equip an unlocked title
    EquipTitle { title_id: i64 },

    /// Remove the equipped title
    UnequipTitle,

    /// List conversations
    Conversations,

    /// Show the messages of a conversation
    Messages { conversation_id: i64 },

    /// Send a message to a user, starting a conversation if needed
    Send { user_id: i64, text: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "inclusa=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let api = ApiClient::new(ClientConfig::new(&cli.api_url))
        .map_err(|e| miette::miette!("{}", e))?;
    let store = Store::new(api, SyncConfig::default());
    let mut notices = store.subscribe_notices();

    let result = run(&store, cli).await;
    commands::drain_notices(&mut notices);
    result
}

/// Install credentials, then dispatch the subcommand.
async fn run(store: &Store, cli: Cli) -> Result<()> {
    let Cli {
        token,
        email,
        password,
        command,
        ..
    } = cli;

    if let Commands::Login = command {
        let (email, password) = credentials(email, password)?;
        return commands::login(store, &email, &password).await;
    }
    if let Commands::Register {
        name,
        state,
        city,
        cep,
        bio,
        groups,
    } = command
    {
        let (email, password) = credentials(email, password)?;
        let request = RegisterRequest {
            name,
            email,
            password,
            cep,
            state,
            city,
            bio,
            vulnerability_groups: groups,
        };
        return commands::register(store, request).await;
    }

    match (token, email, password) {
        (Some(token), _, _) => store.api().set_token(token).await,
        (None, Some(email), Some(password)) => {
            store
                .login(&email, &password)
                .await
                .map_err(|e| miette::miette!("login failed: {}", e))?;
        }
        // Public commands still work without credentials
        _ => {}
    }

    match command {
        Commands::Login | Commands::Register { .. } => Ok(()),

        Commands::Me => commands::me(store).await,

        Commands::Profile {
            name,
            state,
            city,
            cep,
            bio,
            groups,
            remove_photo,
        } => {
            let update = ProfileUpdate {
                name,
                cep,
                state,
                city,
                bio,
                vulnerability_groups: groups,
            };
            commands::update_profile(store, update, remove_photo).await
        }

        Commands::Users {
            state,
            city,
            limit,
            offset,
            locations,
        } => {
            let filters = UserFilters {
                limit: Some(limit),
                offset: Some(offset),
                state,
                city,
            };
            commands::users(store, filters, locations).await
        }

        Commands::Groups => commands::groups(store).await,

        Commands::Feed {
            category,
            author,
            limit,
            offset,
        } => {
            let filters = PostFilters {
                limit: Some(limit),
                offset: Some(offset),
                category,
                author_id: author,
            };
            commands::feed(store, filters).await
        }

        Commands::Show { post_id } => commands::show(store, post_id).await,

        Commands::Post {
            title,
            content,
            category,
        } => {
            let post = NewPost {
                title,
                content,
                category,
            };
            commands::create_post(store, post).await
        }

        Commands::DeletePost { post_id } => commands::delete_post(store, post_id).await,

        Commands::Comment { post_id, content } => {
            commands::comment(store, post_id, content).await
        }

        Commands::Like { post_id } => commands::like(store, post_id).await,

        Commands::CommentLike {
            post_id,
            comment_id,
        } => commands::comment_like(store, post_id, comment_id).await,

        Commands::Courses {
            limit,
            offset,
            areas,
        } => {
            let filters = CourseFilters {
                limit: Some(limit),
                offset: Some(offset),
            };
            commands::courses(store, filters, areas).await
        }

        Commands::Jobs {
            field,
            location,
            page,
            job_type,
            experience_level,
            work_type,
        } => {
            let filters = JobFilters {
                field,
                location,
                page,
                sort_by: None,
                job_type,
                experience_level,
                work_type,
            };
            commands::jobs(store, filters).await
        }

        Commands::Progress { history } => commands::progress(store, history).await,

        Commands::EquipTitle { title_id } => commands::equip_title(store, title_id).await,

        Commands::UnequipTitle => commands::unequip_title(store).await,

        Commands::Conversations => commands::conversations(store).await,

        Commands::Messages { conversation_id } => {
            commands::messages(store, conversation_id).await
        }

        Commands::Send { user_id, text } => commands::send(store, user_id, &text).await,
    }
}

fn credentials(email: Option<String>, password: Option<String>) -> Result<(String, String)> {
    match (email, password) {
        (Some(email), Some(password)) => Ok((email, password)),
        _ => Err(miette::miette!(
            "email and password are required (--email/--password or INCLUSA_EMAIL/INCLUSA_PASSWORD)"
        )),
    }
}
