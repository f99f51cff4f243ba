//! Cache fingerprints and stale times for every query the client makes.

use std::time::Duration;

use inclusa_api::{CourseFilters, JobFilters, PostFilters, UserFilters};
use inclusa_sync::Fingerprint;

pub const CURRENT_USER_STALE: Duration = Duration::from_secs(5 * 60);
pub const USER_LOCATIONS_STALE: Duration = Duration::from_secs(5 * 60);
pub const VULNERABILITY_GROUPS_STALE: Duration = Duration::from_secs(10 * 60);
pub const COURSE_AREAS_STALE: Duration = Duration::from_secs(15 * 60);
pub const LEVELS_STALE: Duration = Duration::from_secs(30 * 60);

/// Users fetched to derive the location directory.
pub const LOCATION_SAMPLE: u32 = 1000;

// Users

/// Every user list, whatever its filters.
pub fn all_users() -> Fingerprint {
    Fingerprint::new("users")
}

pub fn users(filters: &UserFilters) -> Fingerprint {
    all_users().with(&filters.to_query())
}

pub fn user(id: i64) -> Fingerprint {
    Fingerprint::new("user").with(id)
}

pub fn current_user() -> Fingerprint {
    Fingerprint::new("currentUser")
}

pub fn user_locations() -> Fingerprint {
    Fingerprint::new("usersLocations")
}

pub fn vulnerability_groups() -> Fingerprint {
    Fingerprint::new("gruposVulnerabilidade")
}

// Forum

/// Every post list, whatever its filters.
pub fn all_posts() -> Fingerprint {
    Fingerprint::new("posts")
}

pub fn posts(filters: &PostFilters) -> Fingerprint {
    all_posts().with(&filters.to_query())
}

pub fn post(id: i64) -> Fingerprint {
    Fingerprint::new("post").with(id)
}

/// Every comment list.
pub fn all_comments() -> Fingerprint {
    Fingerprint::new("comments")
}

pub fn comments(post_id: i64) -> Fingerprint {
    all_comments().with(post_id)
}

pub fn comment(id: i64) -> Fingerprint {
    Fingerprint::new("comment").with(id)
}

// Courses

pub fn courses(filters: &CourseFilters) -> Fingerprint {
    Fingerprint::new("courses").with(&filters.to_query())
}

pub fn course(id: i64) -> Fingerprint {
    Fingerprint::new("course").with(id)
}

pub fn course_areas() -> Fingerprint {
    Fingerprint::new("courseAreas")
}

// XP

pub fn progress() -> Fingerprint {
    Fingerprint::new("userProgress")
}

pub fn xp_history(limit: u32) -> Fingerprint {
    Fingerprint::new("xpHistory").with(i64::from(limit))
}

pub fn levels() -> Fingerprint {
    Fingerprint::new("levels")
}

pub fn next_level() -> Fingerprint {
    Fingerprint::new("nextLevel")
}

// Chat

pub fn conversations() -> Fingerprint {
    Fingerprint::new("conversations")
}

pub fn messages(conversation_id: i64) -> Fingerprint {
    Fingerprint::new("messages").with(conversation_id)
}

pub fn conversation_with(user_id: i64) -> Fingerprint {
    Fingerprint::new("conversationWithUser").with(user_id)
}

pub fn unread_count() -> Fingerprint {
    Fingerprint::new("unreadCount")
}

// Jobs and statistics

pub fn jobs(filters: &JobFilters) -> Fingerprint {
    Fingerprint::new("jobs").with(&filters.to_query())
}

pub fn user_stats(user_id: Option<i64>) -> Fingerprint {
    let key = Fingerprint::new("userStats");
    match user_id {
        Some(id) => key.with(id),
        None => key.with("me"),
    }
}
