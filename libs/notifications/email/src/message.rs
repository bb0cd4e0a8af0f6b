//! Message construction: template rendering, RFC 5322 headers and the
//! quoted-printable body.

use crate::config::{EmailParams, TokenGenFn};
use crate::error::{NotificationError, NotificationResult};
use crate::models::{
    ReplyTemplateData, Request, VerificationTemplateData, COMMENT_ANCHOR, COMMENT_DATE_FORMAT,
};
use crate::templates::TemplateEngine;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Local, Utc};
use std::fmt;

const REPLY_SUBJECT: &str = "New reply to your comment";
const ADMIN_SUBJECT: &str = "New comment to your site";
const HTML_CONTENT_TYPE: &str = "text/html";
const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

// 45 bytes encode to 60 base64 chars, 72 with the `=?UTF-8?B?...?=` wrapper
const ENCODED_WORD_BYTES: usize = 45;

/// Headers plus encoded body, ready to be written after DATA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage(String);

impl RenderedMessage {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Value of the first header called `name`, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers().find_map(|line| {
            let (key, value) = line.split_once(": ")?;
            key.eq_ignore_ascii_case(name).then_some(value)
        })
    }

    /// Encoded body, everything after the blank line.
    pub fn body(&self) -> &str {
        self.0.split_once("\r\n\r\n").map(|(_, body)| body).unwrap_or("")
    }

    fn headers(&self) -> impl Iterator<Item = &str> {
        let head = self.0.split_once("\r\n\r\n").map(|(head, _)| head).unwrap_or(&self.0);
        head.split("\r\n")
    }
}

impl fmt::Display for RenderedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Renders reply and verification messages
pub struct MessageBuilder {
    from: String,
    verification_subject: String,
    subscribe_url: String,
    unsubscribe_url: String,
    token_gen: Option<TokenGenFn>,
    templates: TemplateEngine,
}

impl MessageBuilder {
    /// `params` should already have its defaults applied.
    pub fn new(params: &EmailParams, templates: TemplateEngine) -> Self {
        Self {
            from: params.from.clone(),
            verification_subject: params.verification_subject.clone(),
            subscribe_url: params.subscribe_url.clone(),
            unsubscribe_url: params.unsubscribe_url.clone(),
            token_gen: params.token_gen.clone(),
            templates,
        }
    }

    /// Verification message; never carries an unsubscribe link.
    pub fn build_verification_message(
        &self,
        user: &str,
        email: &str,
        token: &str,
        site: &str,
    ) -> NotificationResult<RenderedMessage> {
        let body = self.templates.render_verification(&VerificationTemplateData {
            user: user.to_string(),
            token: token.to_string(),
            email: email.to_string(),
            site: site.to_string(),
            subscribe_url: self.subscribe_url.clone(),
        })?;

        Ok(self.build_message(
            &self.verification_subject,
            &body,
            email,
            Some(HTML_CONTENT_TYPE),
            "",
        ))
    }

    /// Reply notification for `req`. Admin messages get no unsubscribe link.
    pub fn build_reply_message(
        &self,
        req: &Request,
        for_admin: bool,
    ) -> NotificationResult<RenderedMessage> {
        let mut subject = if for_admin { ADMIN_SUBJECT } else { REPLY_SUBJECT }.to_string();
        if !req.comment.post_title.is_empty() {
            subject.push_str(&format!(" for \"{}\"", req.comment.post_title));
        }

        let site_id = &req.comment.locator.site_id;
        let token = self.unsubscribe_token(&req.parent.user.id, &req.email, site_id)?;
        let unsubscribe_link = if for_admin {
            String::new()
        } else {
            format!("{}?site={}&tkn={}", self.unsubscribe_url, site_id, token)
        };

        let mut data = ReplyTemplateData {
            user_name: req.comment.user.name.clone(),
            user_picture: req.comment.user.picture.clone(),
            comment_text: req.comment.text.clone(),
            comment_link: req.comment.permalink(),
            comment_date: format_comment_date(&req.comment.timestamp),
            post_title: req.comment.post_title.clone(),
            email: req.email.clone(),
            unsubscribe_link: unsubscribe_link.clone(),
            for_admin,
            ..Default::default()
        };

        // admin messages may come without a parent
        if !req.comment.parent_id.is_empty() {
            let parent_link = format!("{}{}{}", req.comment.locator.url, COMMENT_ANCHOR, req.parent.id);
            data.parent_user_name = req.parent.user.name.clone();
            data.parent_user_picture = req.parent.user.picture.clone();
            data.parent_comment_text = req.parent.text.clone();
            data.parent_comment_link = parent_link;
            data.parent_comment_date = format_comment_date(&req.parent.timestamp);
        }

        let body = self.templates.render_reply(&data)?;
        Ok(self.build_message(
            &subject,
            &body,
            &req.email,
            Some(HTML_CONTENT_TYPE),
            &unsubscribe_link,
        ))
    }

    fn unsubscribe_token(&self, user_id: &str, email: &str, site_id: &str) -> NotificationResult<String> {
        let token_gen = self.token_gen.as_ref().ok_or_else(|| NotificationError::Token {
            source: "unsubscribe token generator is not configured".into(),
        })?;
        token_gen(user_id, email, site_id).map_err(|e| NotificationError::Token { source: e })
    }

    /// Assemble headers in fixed order and append the encoded body.
    pub fn build_message(
        &self,
        subject: &str,
        body: &str,
        to: &str,
        content_type: Option<&str>,
        unsubscribe_link: &str,
    ) -> RenderedMessage {
        let mut message = String::with_capacity(body.len() * 3 / 2 + 512);
        let mut add_header = |name: &str, value: &str| {
            message.push_str(name);
            message.push_str(": ");
            message.push_str(&single_line(value));
            message.push_str("\r\n");
        };

        add_header("From", &self.from);
        add_header("To", to);
        add_header("Subject", &encode_header_value(&single_line(subject)));
        add_header("Content-Transfer-Encoding", "quoted-printable");

        if let Some(content_type) = content_type.filter(|c| !c.is_empty()) {
            add_header("MIME-version", "1.0");
            add_header("Content-Type", &format!("{}; charset=\"UTF-8\"", content_type));
        }

        if !unsubscribe_link.is_empty() {
            add_header("List-Unsubscribe-Post", "List-Unsubscribe=One-Click");
            add_header("List-Unsubscribe", &format!("<{}>", unsubscribe_link));
        }

        add_header("Date", &Local::now().format(DATE_FORMAT).to_string());

        message.push_str("\r\n");
        message.push_str(&encode_body(body));
        RenderedMessage(message)
    }
}

/// Quoted-printable encode a message body.
///
/// Line endings are normalised to CRLF first so they stay hard line breaks
/// instead of being escaped as `=0A`.
pub fn encode_body(body: &str) -> String {
    let body = body.replace("\r\n", "\n").replace('\n', "\r\n");
    quoted_printable::encode_to_str(body.as_bytes())
}

/// RFC 2047 encode a header value if it contains non-ASCII characters.
///
/// Long values are split on character boundaries into several encoded words,
/// each within the 75 character limit.
pub fn encode_header_value(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for c in value.chars() {
        if chunk.len() + c.len_utf8() > ENCODED_WORD_BYTES {
            words.push(encode_word(&chunk));
            chunk.clear();
        }
        chunk.push(c);
    }
    if !chunk.is_empty() {
        words.push(encode_word(&chunk));
    }
    words.join(" ")
}

fn encode_word(text: &str) -> String {
    format!("=?UTF-8?B?{}?=", BASE64.encode(text.as_bytes()))
}

/// Header values must stay on one line; CR and LF become spaces.
fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

fn format_comment_date(ts: &DateTime<Utc>) -> String {
    ts.format(COMMENT_DATE_FORMAT).to_string()
}
