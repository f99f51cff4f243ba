//! Subcommand handlers. Each renders plain text to stdout.

use miette::Result;
use tokio::sync::broadcast;

use inclusa::Store;
use inclusa_api::{
    ApiError, CourseFilters, Created, JobFilters, NewComment, NewPost, PostFilters,
    ProfileUpdate, RegisterRequest, UserFilters,
};
use inclusa_sync::{Notice, NoticeLevel, Query};

fn report(error: ApiError) -> miette::Report {
    miette::miette!("{}", error)
}

/// Warn when a read fell back to what was cached before a failed refresh.
fn shown<T>(query: Query<T>) -> Query<T> {
    if let Some(error) = &query.error {
        eprintln!("! showing cached data, refresh failed: {}", error);
    }
    query
}

/// Print whatever notices were emitted during the command.
pub fn drain_notices(notices: &mut broadcast::Receiver<Notice>) {
    while let Ok(notice) = notices.try_recv() {
        match notice.level {
            NoticeLevel::Success => println!("✓ {}", notice.message),
            NoticeLevel::Error => eprintln!("✗ {}", notice.message),
        }
    }
}

// =============================================================================
// Session and profile
// =============================================================================

pub async fn login(store: &Store, email: &str, password: &str) -> Result<()> {
    let user = store.login(email, password).await.map_err(report)?;
    let token = store.api().token().await.unwrap_or_default();
    println!("Logged in as {} <{}>", user.name, user.email);
    println!("export INCLUSA_TOKEN={}", token);
    Ok(())
}

pub async fn register(store: &Store, request: RegisterRequest) -> Result<()> {
    let user = store.register(&request).await.map_err(report)?;
    println!("Account created for {} (id {})", user.name, user.id);
    Ok(())
}

pub async fn me(store: &Store) -> Result<()> {
    let user = store.current_user().await.map(shown).map_err(report)?;
    let stats = store.user_stats(None).await.map(shown).map_err(report)?;

    println!("{} <{}>", user.name, user.email);
    if let (Some(city), Some(state)) = (&user.city, &user.state) {
        println!("  {} - {}", city, state);
    }
    if let Some(bio) = &user.bio {
        println!("  {}", bio);
    }
    for group in &user.vulnerability_groups {
        println!("  [{}] {}", group.category, group.kind);
    }
    println!(
        "  level {} · {} XP · {} posts · {} comments · {} likes received",
        user.level, user.xp, stats.total_posts, stats.total_comments, stats.total_likes
    );
    if let Some(rank) = stats.community_rank {
        println!("  community rank #{}", rank);
    }
    Ok(())
}

pub async fn update_profile(store: &Store, update: ProfileUpdate, remove_photo: bool) -> Result<()> {
    if remove_photo {
        let ack = store.remove_profile_photo().await.map_err(report)?;
        println!("{}", ack.message);
    }
    if update != ProfileUpdate::default() {
        let user = store.update_profile(&update).await.map_err(report)?;
        println!("Profile updated for {}", user.name);
    }
    Ok(())
}

pub async fn users(
    store: &Store,
    filters: UserFilters,
    locations: bool,
) -> Result<()> {
    if locations {
        let directory = store.user_locations().await.map(shown).map_err(report)?;
        for state in &directory.states {
            println!("{}: {}", state, directory.cities(state).join(", "));
        }
        return Ok(());
    }

    let page = store.users(&filters).await.map(shown).map_err(report)?;
    for user in &page.items {
        let place = match (&user.city, &user.state) {
            (Some(city), Some(state)) => format!("{} - {}", city, state),
            (None, Some(state)) => state.clone(),
            _ => String::new(),
        };
        println!("#{:<5} {:<30} {}", user.id, user.name, place);
    }
    println!("{} of {} users", page.len(), page.total);
    Ok(())
}

pub async fn groups(store: &Store) -> Result<()> {
    let groups = store.vulnerability_groups().await.map(shown).map_err(report)?;
    for group in groups.iter() {
        println!("#{:<4} {:<25} {}", group.id, group.category, group.kind);
    }
    Ok(())
}

// =============================================================================
// Forum
// =============================================================================

pub async fn feed(store: &Store, filters: PostFilters) -> Result<()> {
    let page = store.posts(&filters).await.map(shown).map_err(report)?;
    if page.is_empty() {
        println!("No posts yet.");
        return Ok(());
    }

    for post in &page.items {
        let likes = store.post_like_display(post);
        let heart = if likes.liked { "♥" } else { "♡" };
        println!(
            "#{:<5} {} {:<3} 💬 {:<3} {}",
            post.id, heart, likes.count, post.comment_count, post.title
        );
        if let Some(author) = &post.author_name {
            println!("       by {}", author);
        }
    }
    Ok(())
}

pub async fn show(store: &Store, post_id: i64) -> Result<()> {
    let post = store.post(post_id).await.map(shown).map_err(report)?;
    let comments = store.comments(post_id).await.map(shown).map_err(report)?;
    let likes = store.post_like_display(&post);

    println!("{}", post.title);
    if let Some(category) = &post.category {
        println!("[{}]", category);
    }
    println!();
    println!("{}", post.content);
    println!();
    println!("{} likes · {} comments", likes.count, comments.total);

    for comment in &comments.items {
        let likes = store.comment_like_display(comment);
        println!(
            "  #{} {}: {} ({} likes)",
            comment.id,
            comment.author_name.as_deref().unwrap_or("anonymous"),
            comment.content,
            likes.count
        );
    }
    Ok(())
}

pub async fn create_post(store: &Store, post: NewPost) -> Result<()> {
    match store.create_post(&post).await.map_err(report)? {
        Created::Record(post) => println!("Published post #{}", post.id),
        Created::Ack { message } => println!("{}", message),
    }
    Ok(())
}

pub async fn delete_post(store: &Store, post_id: i64) -> Result<()> {
    let ack = store.delete_post(post_id).await.map_err(report)?;
    println!("{}", ack.message);
    Ok(())
}

pub async fn comment(store: &Store, post_id: i64, content: String) -> Result<()> {
    let created = store
        .create_comment(&NewComment { post_id, content })
        .await
        .map_err(report)?;
    match created {
        Created::Record(comment) => println!("Comment #{} added", comment.id),
        Created::Ack { message } => println!("{}", message),
    }
    Ok(())
}

pub async fn like(store: &Store, post_id: i64) -> Result<()> {
    let state = store.toggle_post_like(post_id).await.map_err(report)?;
    let verb = if state.liked { "Liked" } else { "Unliked" };
    println!("{} post #{} ({} likes)", verb, post_id, state.count);
    Ok(())
}

pub async fn comment_like(store: &Store, post_id: i64, comment_id: i64) -> Result<()> {
    let comments = store.comments(post_id).await.map(shown).map_err(report)?;
    let comment = comments
        .items
        .iter()
        .find(|c| c.id == comment_id)
        .ok_or_else(|| miette::miette!("comment #{} not found on post #{}", comment_id, post_id))?;

    let state = store.toggle_comment_like(comment).await.map_err(report)?;
    let verb = if state.liked { "Liked" } else { "Unliked" };
    println!("{} comment #{} ({} likes)", verb, comment_id, state.count);
    Ok(())
}

// =============================================================================
// Courses and jobs
// =============================================================================

pub async fn courses(store: &Store, filters: CourseFilters, areas: bool) -> Result<()> {
    if areas {
        for area in store.course_areas().await.map(shown).map_err(report)?.iter() {
            println!("{}", area);
        }
        return Ok(());
    }

    let page = store.courses(&filters).await.map(shown).map_err(report)?;
    for course in &page.items {
        let hours = course
            .workload_hours
            .map(|h| format!("{}h", h))
            .unwrap_or_default();
        println!(
            "#{:<5} {:<50} {:<20} {}",
            course.id,
            course.title,
            course.area.as_deref().unwrap_or("-"),
            hours
        );
        println!("       {}", course.url);
    }
    Ok(())
}

pub async fn jobs(store: &Store, filters: JobFilters) -> Result<()> {
    let Some(page) = store.search_jobs(&filters).await.map_err(report)?.map(shown) else {
        println!("Give a role (--field) or a location (--location) to search.");
        return Ok(());
    };

    for job in &page.items {
        println!("{} at {}", job.job_position, job.company_name);
        if let Some(location) = &job.job_location {
            println!("  {}", location);
        }
        println!("  {}", job.job_link);
    }
    println!("{} openings", page.total);
    Ok(())
}

// =============================================================================
// XP
// =============================================================================

pub async fn progress(store: &Store, history: u32) -> Result<()> {
    let progress = store.progress().await.map(shown).map_err(report)?;
    let next = store.next_level().await.map(shown).map_err(report)?;
    let levels = store.levels().await.map(shown).map_err(report)?;
    let equipped = store.equipped_title_display(&progress);

    println!("Level {} · {} XP", progress.level, progress.xp);
    match next.xp_for_next_level {
        Some(_) => println!(
            "{:.0}% to level {} ({} XP to go)",
            next.percent,
            next.level + 1,
            next.xp_remaining
        ),
        None => println!("Highest level reached"),
    }

    println!();
    println!("Titles:");
    for level in levels.iter() {
        let marker = if Some(level.id) == equipped {
            "*"
        } else if level.level <= progress.level {
            " "
        } else {
            "🔒"
        };
        println!(
            "{} #{:<3} lvl {:<3} {:<25} {} XP",
            marker, level.id, level.level, level.title, level.xp_required
        );
    }

    if history > 0 {
        println!();
        println!("Recent XP:");
        for event in store.xp_history(history).await.map(shown).map_err(report)?.iter() {
            println!(
                "  +{:<4} {} {}",
                event.xp_gained,
                event.action,
                event.occurred_at.as_deref().unwrap_or("")
            );
        }
    }
    Ok(())
}

pub async fn equip_title(store: &Store, title_id: i64) -> Result<()> {
    store.equip_title(title_id).await.map_err(report)?;
    println!("Title #{} equipped", title_id);
    Ok(())
}

pub async fn unequip_title(store: &Store) -> Result<()> {
    store.remove_title().await.map_err(report)?;
    println!("Equipped title removed");
    Ok(())
}

// =============================================================================
// Chat
// =============================================================================

pub async fn conversations(store: &Store) -> Result<()> {
    let conversations = store.conversations().await.map(shown).map_err(report)?;
    let unread = store.unread_count().await.map(shown).map_err(report)?;

    for conversation in &conversations.items {
        println!(
            "#{:<5} {:<30} {}",
            conversation.id,
            conversation.other_user_name.as_deref().unwrap_or("-"),
            conversation.last_message_at.as_deref().unwrap_or("")
        );
    }
    println!("{} unread messages", unread.unread);
    Ok(())
}

pub async fn messages(store: &Store, conversation_id: i64) -> Result<()> {
    let messages = store.messages(conversation_id).await.map(shown).map_err(report)?;
    for message in &messages.items {
        println!(
            "[{}] {}: {}",
            message.sent_at.as_deref().unwrap_or(""),
            message
                .sender_name
                .clone()
                .unwrap_or_else(|| format!("#{}", message.sender_id)),
            message.text
        );
    }
    Ok(())
}

pub async fn send(store: &Store, user_id: i64, text: &str) -> Result<()> {
    let conversation = store.open_conversation(user_id).await.map_err(report)?;
    store
        .send_message(conversation.id, text)
        .await
        .map_err(report)?;
    println!("Sent to conversation #{}", conversation.id);
    Ok(())
}
