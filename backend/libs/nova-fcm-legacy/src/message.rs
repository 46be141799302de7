use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::str::FromStr;

use crate::errors::FCMError;
use crate::instance_id::normalize_topic;

/// Maximum time-to-live accepted by the gateway (4 weeks, in seconds)
pub const MAX_TTL: u32 = 2_419_200;

const TOPIC_PREFIX: &str = "/topics/";

/// Delivery priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

/// Anything other than `"high"` maps to normal priority.
impl FromStr for Priority {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s == "high" {
            Priority::High
        } else {
            Priority::Normal
        })
    }
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }
}

/// Who a message is addressed to. Exactly one kind per message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A single registration token
    Device(String),
    /// Multicast to a list of registration tokens
    RegistrationIds(Vec<String>),
    /// A topic name, stored without the `/topics/` prefix
    Topic(String),
    /// A topic condition expression, e.g. `'news' in topics || 'sports' in topics`
    Condition(String),
}

impl Target {
    pub fn is_topic(&self) -> bool {
        matches!(self, Target::Topic(_) | Target::Condition(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Target::Device(_) => "single device",
            Target::RegistrationIds(_) => "registration id list",
            Target::Topic(_) => "topic",
            Target::Condition(_) => "condition",
        }
    }
}

/// Notification display payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_loc_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_loc_args: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_loc_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_loc_args: Option<String>,
}

impl NotificationPayload {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            body: Some(body.into()),
            ..Default::default()
        }
    }
}

/// Outbound notification for the legacy HTTP send endpoint
///
/// Built by value: every `with_*` call consumes the message and returns the
/// updated one, so a message handed to [`crate::FcmClient::send`] can be
/// reused across sends without leaking state between them.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    target: Target,
    data: HashMap<String, String>,
    notification: Option<NotificationPayload>,
    priority: Option<Priority>,
    time_to_live: Option<u32>,
    collapse_key: Option<String>,
    restricted_package_name: Option<String>,
    dry_run: bool,
    content_available: bool,
    delay_while_idle: bool,
    extra: BTreeMap<String, serde_json::Value>,
}

impl Message {
    fn with_target(target: Target, data: HashMap<String, String>) -> Self {
        Self {
            target,
            data,
            notification: None,
            priority: None,
            time_to_live: None,
            collapse_key: None,
            restricted_package_name: None,
            dry_run: false,
            content_available: false,
            delay_while_idle: false,
            extra: BTreeMap::new(),
        }
    }

    /// Message addressed to a single registration token
    pub fn to_device(token: impl Into<String>, data: HashMap<String, String>) -> Self {
        Self::with_target(Target::Device(token.into()), data)
    }

    /// Multicast message addressed to a list of registration tokens
    pub fn to_registration_ids(ids: &[String], data: HashMap<String, String>) -> Self {
        Self::with_target(Target::RegistrationIds(ids.to_vec()), data)
    }

    /// Message addressed to a topic; `"news"`, `"/topics/news"` and
    /// `"/TOPICS/news"` all address the same topic.
    pub fn to_topic(topic: &str, data: HashMap<String, String>) -> Self {
        Self::with_target(Target::Topic(normalize_topic(topic).to_string()), data)
    }

    /// Message addressed to a topic condition expression
    pub fn to_condition(condition: impl Into<String>, data: HashMap<String, String>) -> Self {
        Self::with_target(Target::Condition(condition.into()), data)
    }

    /// Replace the target, keeping payload and options.
    pub fn retarget(mut self, target: Target) -> Self {
        self.target = match target {
            Target::Topic(topic) => Target::Topic(normalize_topic(&topic).to_string()),
            other => other,
        };
        self
    }

    /// Extend a multicast target with more registration tokens.
    ///
    /// Fails unless the message already targets a non-empty token list.
    pub fn append_recipients(mut self, ids: &[String]) -> Result<Self, FCMError> {
        match &mut self.target {
            Target::RegistrationIds(existing) if !existing.is_empty() => {
                existing.extend_from_slice(ids);
                Ok(self)
            }
            Target::RegistrationIds(_) => Err(FCMError::InvalidArgument(
                "cannot append recipients to an empty registration id list".to_string(),
            )),
            other => Err(FCMError::InvalidArgument(format!(
                "cannot append recipients to a {} target",
                other.kind()
            ))),
        }
    }

    /// Replace the data payload, keeping the target.
    pub fn set_data(mut self, data: HashMap<String, String>) -> Self {
        self.data = data;
        self
    }

    pub fn with_notification(mut self, notification: NotificationPayload) -> Self {
        self.notification = Some(notification);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Time-to-live in seconds, capped at [`MAX_TTL`].
    pub fn with_time_to_live(mut self, ttl_secs: u32) -> Self {
        self.time_to_live = Some(ttl_secs.min(MAX_TTL));
        self
    }

    pub fn with_collapse_key(mut self, key: impl Into<String>) -> Self {
        self.collapse_key = Some(key.into());
        self
    }

    pub fn with_restricted_package_name(mut self, package: impl Into<String>) -> Self {
        self.restricted_package_name = Some(package.into());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_content_available(mut self, content_available: bool) -> Self {
        self.content_available = content_available;
        self
    }

    pub fn with_delay_while_idle(mut self, delay_while_idle: bool) -> Self {
        self.delay_while_idle = delay_while_idle;
        self
    }

    /// Attach an additional top-level request field (vendor blocks such as
    /// `android` or `apns`). The value is serialized eagerly.
    pub fn with_extra<T: Serialize>(mut self, key: &str, value: &T) -> Result<Self, FCMError> {
        let value = serde_json::to_value(value).map_err(FCMError::Encoding)?;
        self.extra.insert(key.to_string(), value);
        Ok(self)
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn data(&self) -> &HashMap<String, String> {
        &self.data
    }

    pub fn priority(&self) -> Option<Priority> {
        self.priority
    }

    pub fn time_to_live(&self) -> Option<u32> {
        self.time_to_live
    }

    /// Tokens addressed by this message, in request order. Empty for topic
    /// and condition targets.
    pub fn registration_ids(&self) -> Vec<&str> {
        match &self.target {
            Target::Device(token) => vec![token.as_str()],
            Target::RegistrationIds(ids) => ids.iter().map(String::as_str).collect(),
            Target::Topic(_) | Target::Condition(_) => Vec::new(),
        }
    }

    /// Serialize to the JSON body of a send request.
    pub fn encode(&self) -> Result<Vec<u8>, FCMError> {
        let (to, registration_ids, condition) = match &self.target {
            Target::Device(token) => (Some(token.clone()), None, None),
            Target::RegistrationIds(ids) => (None, Some(ids.as_slice()), None),
            Target::Topic(topic) => (Some(format!("{}{}", TOPIC_PREFIX, topic)), None, None),
            Target::Condition(condition) => (None, None, Some(condition.as_str())),
        };

        let wire = WireMessage {
            to,
            registration_ids,
            condition,
            data: &self.data,
            notification: self.notification.as_ref(),
            priority: self.priority,
            time_to_live: self.time_to_live,
            collapse_key: self.collapse_key.as_deref(),
            restricted_package_name: self.restricted_package_name.as_deref(),
            dry_run: self.dry_run,
            content_available: self.content_available,
            delay_while_idle: self.delay_while_idle,
            extra: &self.extra,
        };

        serde_json::to_vec(&wire).map_err(FCMError::Encoding)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_empty_data(data: &&HashMap<String, String>) -> bool {
    data.is_empty()
}

/// Wire shape of the legacy send request
#[derive(Serialize)]
struct WireMessage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    registration_ids: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    condition: Option<&'a str>,
    #[serde(skip_serializing_if = "is_empty_data")]
    data: &'a HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification: Option<&'a NotificationPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_to_live: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    collapse_key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    restricted_package_name: Option<&'a str>,
    #[serde(skip_serializing_if = "is_false")]
    dry_run: bool,
    #[serde(skip_serializing_if = "is_false")]
    content_available: bool,
    #[serde(skip_serializing_if = "is_false")]
    delay_while_idle: bool,
    #[serde(flatten)]
    extra: &'a BTreeMap<String, serde_json::Value>,
}
