//! Pure inbound-filtering logic for Telegram, kept free of SDK types so it is unit-testable
//! without a live bot (§4.J).

/// Result of applying the Telegram inbound filter to a raw message.
#[derive(Debug, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Accepted; `content` has had any leading `@bot_username` mention stripped.
    Accept { content: String },
    /// Dropped: blacklisted, not whitelisted, or (in a group) missing the required mention.
    Drop,
}

/// Applies the Telegram-specific pre-filter (§4.J steps 1-3):
/// 1. drop if blacklisted, or whitelist is non-empty and the user is absent from it;
/// 2. in groups, require the bot's `@username` to appear in the text unless `require_mention`
///    is explicitly `false`;
/// 3. strip the mention token from the content before dispatch.
pub fn filter_inbound(
    user_id: &str,
    whitelist: &[String],
    blacklist: &[String],
    is_group: bool,
    require_mention: Option<bool>,
    bot_username: &str,
    content: &str,
) -> FilterOutcome {
    if blacklist.iter().any(|u| u == user_id) {
        return FilterOutcome::Drop;
    }
    if !whitelist.is_empty() && !whitelist.iter().any(|u| u == user_id) {
        return FilterOutcome::Drop;
    }

    let mention = format!("@{bot_username}");
    let requires_mention = is_group && require_mention.unwrap_or(true);

    if requires_mention && !content.contains(&mention) {
        return FilterOutcome::Drop;
    }

    let stripped = if content.contains(&mention) {
        content.replacen(&mention, "", 1).trim().to_string()
    } else {
        content.to_string()
    };

    FilterOutcome::Accept { content: stripped }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blacklisted_user_is_dropped() {
        let outcome = filter_inbound("U1", &[], &["U1".into()], false, None, "bot", "hi");
        assert_eq!(outcome, FilterOutcome::Drop);
    }

    #[test]
    fn non_whitelisted_user_is_dropped_when_whitelist_present() {
        let outcome = filter_inbound("U2", &["U1".into()], &[], false, None, "bot", "hi");
        assert_eq!(outcome, FilterOutcome::Drop);
    }

    #[test]
    fn dm_never_requires_mention() {
        let outcome = filter_inbound("U1", &[], &[], false, None, "bot", "hi");
        assert_eq!(outcome, FilterOutcome::Accept { content: "hi".into() });
    }

    #[test]
    fn group_without_mention_is_dropped_by_default() {
        let outcome = filter_inbound("U1", &[], &[], true, None, "bot", "hi");
        assert_eq!(outcome, FilterOutcome::Drop);
    }

    #[test]
    fn group_with_mention_is_accepted_and_mention_is_stripped() {
        let outcome = filter_inbound("U1", &[], &[], true, None, "bot", "@bot hi there");
        assert_eq!(outcome, FilterOutcome::Accept { content: "hi there".into() });
    }

    #[test]
    fn require_mention_false_accepts_group_messages_without_mention() {
        let outcome = filter_inbound("U1", &[], &[], true, Some(false), "bot", "hi");
        assert_eq!(outcome, FilterOutcome::Accept { content: "hi".into() });
    }
}
