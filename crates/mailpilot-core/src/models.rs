//! Domain types shared across the Mailpilot pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mail retrieval protocol for a linked account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Stateful IMAP session (connect/login/select/fetch/logout)
    Imap,
    /// Token-based REST polling (bearer token, paginated list + get)
    Rest,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Imap => "imap",
            Self::Rest => "rest",
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "imap" => Ok(Self::Imap),
            "rest" => Ok(Self::Rest),
            _ => Err(format!("Unknown protocol: {}", s)),
        }
    }
}

/// Closed set of classification categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Work,
    Personal,
    Finance,
    Shopping,
    Travel,
    Newsletter,
    Social,
    Transactional,
    Spam,
    /// Fallback when classification failed or produced an unknown label
    Uncategorized,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Personal => "personal",
            Self::Finance => "finance",
            Self::Shopping => "shopping",
            Self::Travel => "travel",
            Self::Newsletter => "newsletter",
            Self::Social => "social",
            Self::Transactional => "transactional",
            Self::Spam => "spam",
            Self::Uncategorized => "uncategorized",
        }
    }

    /// All valid category labels, used in classifier prompts and validation errors
    pub fn all() -> &'static [Category] {
        &[
            Self::Work,
            Self::Personal,
            Self::Finance,
            Self::Shopping,
            Self::Travel,
            Self::Newsletter,
            Self::Social,
            Self::Transactional,
            Self::Spam,
            Self::Uncategorized,
        ]
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "work" => Ok(Self::Work),
            "personal" => Ok(Self::Personal),
            "finance" => Ok(Self::Finance),
            "shopping" => Ok(Self::Shopping),
            "travel" => Ok(Self::Travel),
            "newsletter" => Ok(Self::Newsletter),
            "social" => Ok(Self::Social),
            "transactional" => Ok(Self::Transactional),
            "spam" => Ok(Self::Spam),
            "uncategorized" => Ok(Self::Uncategorized),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

/// Action the classifier suggests for a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    Reply,
    Archive,
    Delete,
    FollowUp,
    None,
}

impl SuggestedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reply => "reply",
            Self::Archive => "archive",
            Self::Delete => "delete",
            Self::FollowUp => "follow_up",
            Self::None => "none",
        }
    }
}

impl std::str::FromStr for SuggestedAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reply" => Ok(Self::Reply),
            "archive" => Ok(Self::Archive),
            "delete" => Ok(Self::Delete),
            "follow_up" => Ok(Self::FollowUp),
            "none" => Ok(Self::None),
            _ => Err(format!("Unknown suggested action: {}", s)),
        }
    }
}

/// Trust level derived from reputation counters and overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    Untrusted,
    Neutral,
    Trusted,
    Verified,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Untrusted => "untrusted",
            Self::Neutral => "neutral",
            Self::Trusted => "trusted",
            Self::Verified => "verified",
        }
    }
}

/// Explicit user override on a sender or domain reputation row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustOverride {
    Trusted,
    Untrusted,
}

impl TrustOverride {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trusted => "trusted",
            Self::Untrusted => "untrusted",
        }
    }
}

impl std::str::FromStr for TrustOverride {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trusted" => Ok(Self::Trusted),
            "untrusted" => Ok(Self::Untrusted),
            _ => Err(format!("Unknown trust override: {}", s)),
        }
    }
}

/// Observable interaction with mail from a sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationEvent {
    Received,
    Opened,
    Replied,
    Archived,
    Deleted,
    SpamMarked,
}

impl ReputationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Opened => "opened",
            Self::Replied => "replied",
            Self::Archived => "archived",
            Self::Deleted => "deleted",
            Self::SpamMarked => "spam_marked",
        }
    }
}

impl std::str::FromStr for ReputationEvent {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "received" => Ok(Self::Received),
            "opened" => Ok(Self::Opened),
            "replied" => Ok(Self::Replied),
            "archived" => Ok(Self::Archived),
            "deleted" => Ok(Self::Deleted),
            "spam_marked" => Ok(Self::SpamMarked),
            _ => Err(format!("Unknown reputation event: {}", s)),
        }
    }
}

/// Per-account secret stored encrypted in the vault
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credentials {
    /// IMAP username/password login
    Password {
        username: String,
        password: String,
        host: String,
        port: u16,
    },
    /// OAuth bearer-token REST access
    OAuth {
        client_id: String,
        refresh_token: String,
        access_token: String,
        token_uri: String,
        api_base: String,
        expiry: Option<DateTime<Utc>>,
    },
}

/// A linked mail source account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceAccount {
    pub id: i64,
    pub user_id: String,
    pub address: String,
    pub protocol: Protocol,
    /// Encrypted credential blob (vault format), never exposed decrypted
    #[serde(skip_serializing)]
    pub credentials: String,
    pub active: bool,
    pub last_error: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Opaque incremental-sync position (highest UID or provider page token)
    pub cursor: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for linking a new source account
#[derive(Debug, Clone)]
pub struct NewSourceAccount {
    pub user_id: String,
    pub address: String,
    pub protocol: Protocol,
    /// Already-encrypted credential blob
    pub credentials: String,
}

/// Whether a message arrived in or was sent from the linked mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inbound" => Ok(Self::Inbound),
            "outbound" => Ok(Self::Outbound),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

/// A synced email message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    pub id: i64,
    pub account_id: i64,
    pub provider_message_id: String,
    pub direction: Direction,
    pub from_name: Option<String>,
    pub from_address: String,
    pub to_address: Option<String>,
    pub subject: Option<String>,
    pub snippet: Option<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub body_fetched: bool,
    pub list_unsubscribe: Option<String>,
    pub precedence: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    // Classification fields, all NULL until classified
    pub priority: Option<i64>,
    pub category: Option<Category>,
    pub confidence: Option<f64>,
    pub summary: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub needs_reply: Option<bool>,
    pub suggested_action: Option<SuggestedAction>,
    pub key_entities: Option<KeyEntities>,
    pub classified_at: Option<DateTime<Utc>>,
    // Mailbox flags
    pub is_read: bool,
    pub starred: bool,
    pub archived: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for persisting a newly fetched message
#[derive(Debug, Clone)]
pub struct NewEmail {
    pub account_id: i64,
    pub provider_message_id: String,
    pub direction: Direction,
    pub from_name: Option<String>,
    pub from_address: String,
    pub to_address: Option<String>,
    pub subject: Option<String>,
    pub snippet: Option<String>,
    pub list_unsubscribe: Option<String>,
    pub precedence: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
}

/// Structured entities extracted by the classifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyEntities {
    #[serde(default)]
    pub people: Vec<String>,
    #[serde(default)]
    pub dates: Vec<String>,
    #[serde(default)]
    pub amounts: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<String>,
}

impl KeyEntities {
    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
            && self.dates.is_empty()
            && self.amounts.is_empty()
            && self.tasks.is_empty()
    }
}

/// Validated classification outcome persisted onto an email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: Category,
    /// 1 = most urgent, 5 = least urgent
    pub priority: i64,
    pub confidence: f64,
    pub summary: String,
    pub needs_reply: bool,
    pub deadline: Option<DateTime<Utc>>,
    pub suggested_action: SuggestedAction,
    pub key_entities: KeyEntities,
}

impl ClassificationResult {
    /// Safe fallback when the classifier violated its contract
    pub fn fallback() -> Self {
        Self {
            category: Category::Uncategorized,
            priority: 3,
            confidence: 0.0,
            summary: String::new(),
            needs_reply: false,
            deadline: None,
            suggested_action: SuggestedAction::None,
            key_entities: KeyEntities::default(),
        }
    }
}

/// Raw interaction counters for a sender or domain
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReputationCounters {
    pub received: i64,
    pub opened: i64,
    pub replied: i64,
    pub archived: i64,
    pub deleted: i64,
    pub spam_marked: i64,
}

/// A sender or domain reputation row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationRow {
    pub id: i64,
    pub user_id: String,
    /// Sender address or bare domain, lowercased
    pub key: String,
    pub counters: ReputationCounters,
    pub confidence: f64,
    pub trust_override: Option<TrustOverride>,
    pub updated_at: DateTime<Utc>,
}

/// One append-only correction record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: i64,
    pub email_id: i64,
    pub sender: String,
    pub original_category: Category,
    pub corrected_category: Category,
    pub created_at: DateTime<Utc>,
}

/// Per-category classification accuracy derived from the feedback log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryAccuracy {
    pub category: Category,
    pub total: i64,
    pub corrected: i64,
    pub accuracy: f64,
}

/// Extract a bare lowercased address from a mailbox header value
///
/// Accepts both `Name <addr@host>` and bare `addr@host` forms.
pub fn normalize_address(raw: &str) -> String {
    let raw = raw.trim();
    if let (Some(start), Some(end)) = (raw.rfind('<'), raw.rfind('>')) {
        if start < end {
            return raw[start + 1..end].trim().to_lowercase();
        }
    }
    raw.to_lowercase()
}

/// Extract the display name from a mailbox header value, if present
pub fn display_name(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let start = raw.rfind('<')?;
    let name = raw[..start].trim().trim_matches('"').trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Domain part of an address, lowercased
pub fn domain_of(address: &str) -> Option<String> {
    let at = address.rfind('@')?;
    let domain = address[at + 1..].trim().to_lowercase();
    if domain.is_empty() {
        None
    } else {
        Some(domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_roundtrip() {
        for cat in Category::all() {
            let parsed: Category = cat.as_str().parse().unwrap();
            assert_eq!(*cat, parsed);
        }
    }

    #[test]
    fn test_category_rejects_unknown() {
        assert!("bogus".parse::<Category>().is_err());
        assert!("".parse::<Category>().is_err());
    }

    #[test]
    fn test_suggested_action_roundtrip() {
        for action in [
            SuggestedAction::Reply,
            SuggestedAction::Archive,
            SuggestedAction::Delete,
            SuggestedAction::FollowUp,
            SuggestedAction::None,
        ] {
            let parsed: SuggestedAction = action.as_str().parse().unwrap();
            assert_eq!(action, parsed);
        }
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(
            normalize_address("Alice Smith <Alice@Example.COM>"),
            "alice@example.com"
        );
        assert_eq!(normalize_address("bob@example.com"), "bob@example.com");
        assert_eq!(
            normalize_address("\"Support, Inc.\" <support@shop.io>"),
            "support@shop.io"
        );
    }

    #[test]
    fn test_display_name() {
        assert_eq!(
            display_name("Alice Smith <alice@example.com>").as_deref(),
            Some("Alice Smith")
        );
        assert_eq!(display_name("bob@example.com"), None);
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(
            domain_of("alice@Example.Com").as_deref(),
            Some("example.com")
        );
        assert_eq!(domain_of("not-an-address"), None);
    }

    #[test]
    fn test_fallback_classification() {
        let fb = ClassificationResult::fallback();
        assert_eq!(fb.category, Category::Uncategorized);
        assert_eq!(fb.confidence, 0.0);
        assert!(!fb.needs_reply);
        assert_eq!(fb.suggested_action, SuggestedAction::None);
        assert!(fb.key_entities.is_empty());
    }

    #[test]
    fn test_credentials_serde_tagged() {
        let creds = Credentials::Password {
            username: "user".into(),
            password: "pw".into(),
            host: "mail.example.com".into(),
            port: 993,
        };
        let json = serde_json::to_string(&creds).unwrap();
        assert!(json.contains("\"kind\":\"password\""));
        let back: Credentials = serde_json::from_str(&json).unwrap();
        match back {
            Credentials::Password { port, .. } => assert_eq!(port, 993),
            _ => panic!("wrong variant"),
        }
    }
}
