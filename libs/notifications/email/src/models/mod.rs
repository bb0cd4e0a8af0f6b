use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Anchor appended to a post URL to link a single comment.
pub const COMMENT_ANCHOR: &str = "#remark42__comment-";

/// Date layout used for comment timestamps in rendered messages.
pub const COMMENT_DATE_FORMAT: &str = "%d.%m.%Y at %H:%M";

/// Comment author
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub picture: String,
}

/// Where a comment lives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub site_id: String,
    pub url: String,
}

/// Snapshot of a comment as seen by the notifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    #[serde(default)]
    pub parent_id: String,
    pub user: User,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub post_title: String,
    pub locator: Locator,
}

impl Comment {
    /// Permalink to this comment on its post page.
    pub fn permalink(&self) -> String {
        format!("{}{}{}", self.locator.url, COMMENT_ANCHOR, self.id)
    }
}

/// Verification payload; a non-empty token marks a verification request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationMetadata {
    pub site_id: String,
    pub user: String,
    pub email: String,
    pub token: String,
}

/// A single notification to deliver by email
///
/// An empty `email` means the request isn't deliverable through this channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub comment: Comment,
    /// Comment being replied to; default when `comment.parent_id` is empty
    #[serde(default)]
    pub parent: Comment,
    #[serde(default)]
    pub for_admin: bool,
    #[serde(default)]
    pub verification: VerificationMetadata,
}

impl Request {
    /// Reply notification for `email` about `comment`, answering `parent`.
    pub fn reply(email: impl Into<String>, comment: Comment, parent: Comment) -> Self {
        Self {
            email: email.into(),
            comment,
            parent,
            ..Default::default()
        }
    }

    /// Verification notification carrying `token`.
    pub fn verification(
        email: impl Into<String>,
        user: impl Into<String>,
        site_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        let email = email.into();
        Self {
            email: email.clone(),
            verification: VerificationMetadata {
                site_id: site_id.into(),
                user: user.into(),
                email,
                token: token.into(),
            },
            ..Default::default()
        }
    }

    /// Address the notification to the site administrator.
    pub fn for_admin(mut self) -> Self {
        self.for_admin = true;
        self
    }

    /// Whether the reply author is answering their own comment.
    pub fn is_self_reply(&self) -> bool {
        self.parent.user.id == self.comment.user.id
    }
}

/// Data available to the reply template
///
/// Parent fields stay empty when the comment has no parent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplyTemplateData {
    pub user_name: String,
    pub user_picture: String,
    pub comment_text: String,
    pub comment_link: String,
    pub comment_date: String,
    pub parent_user_name: String,
    pub parent_user_picture: String,
    pub parent_comment_text: String,
    pub parent_comment_link: String,
    pub parent_comment_date: String,
    pub post_title: String,
    pub email: String,
    pub unsubscribe_link: String,
    pub for_admin: bool,
}

/// Data available to the verification template
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationTemplateData {
    pub user: String,
    pub token: String,
    pub email: String,
    pub site: String,
    pub subscribe_url: String,
}
