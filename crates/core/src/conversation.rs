use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Derived key grouping exchanges by caller identity and calendar day.
///
/// The day boundary is the UTC midnight, matching the stored timestamps, even
/// though user-visible clocks elsewhere run on Brasília time. Crossing
/// midnight silently starts a new conversation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn derive(identity: &str, now: DateTime<Utc>) -> Self {
        Self(format!("{identity}_{}", now.format("%Y-%m-%d")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One user turn plus the assistant's reply to it. Immutable once written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub conversation_id: ConversationId,
    pub user_message: String,
    pub assistant_reply: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::ConversationId;

    #[test]
    fn same_identity_same_day_shares_an_identifier() {
        let morning = Utc.with_ymd_and_hms(2025, 11, 5, 9, 0, 0).single().unwrap();
        let evening = Utc.with_ymd_and_hms(2025, 11, 5, 22, 30, 0).single().unwrap();

        let first = ConversationId::derive("filipe@gmproducoes.com", morning);
        let second = ConversationId::derive("filipe@gmproducoes.com", evening);

        assert_eq!(first, second);
        assert_eq!(first.as_str(), "filipe@gmproducoes.com_2025-11-05");
    }

    #[test]
    fn crossing_utc_midnight_starts_a_new_conversation() {
        let before = Utc.with_ymd_and_hms(2025, 11, 5, 23, 59, 0).single().unwrap();
        let after = Utc.with_ymd_and_hms(2025, 11, 6, 0, 1, 0).single().unwrap();

        let first = ConversationId::derive("filipe@gmproducoes.com", before);
        let second = ConversationId::derive("filipe@gmproducoes.com", after);

        assert_ne!(first, second);
    }

    #[test]
    fn distinct_identities_never_collide_on_the_same_day() {
        let now = Utc.with_ymd_and_hms(2025, 11, 5, 12, 0, 0).single().unwrap();

        let owner = ConversationId::derive("filipe@gmproducoes.com", now);
        let visitor = ConversationId::derive("visitante@example.com", now);

        assert_ne!(owner, visitor);
    }
}
