//! Pure inbound-filtering logic for Discord, kept free of SDK types so it is unit-testable
//! without a live client (§4.J).

#[derive(Debug, PartialEq, Eq)]
pub enum FilterOutcome {
    Accept { content: String },
    Drop,
}

/// Applies the Discord-specific pre-filter:
/// 1. drop if blacklisted, or whitelist is non-empty and the user is absent from it;
/// 2. in a guild, drop if `allowed_guilds` is set and the message's guild is not in it;
/// 3. a DM is never treated as a "group" — the mention requirement never applies there, and DMs
///    are dropped outright when `respond_to_dms` is explicitly `false`;
/// 4. in a guild, require the bot's `@mention` unless `require_mention` is explicitly `false`;
/// 5. strip the mention token from the content before dispatch.
#[allow(clippy::too_many_arguments)]
pub fn filter_inbound(
    user_id: &str,
    whitelist: &[String],
    blacklist: &[String],
    is_dm: bool,
    guild_id: Option<i64>,
    allowed_guilds: Option<&[i64]>,
    respond_to_dms: Option<bool>,
    require_mention: Option<bool>,
    bot_mention: &str,
    content: &str,
) -> FilterOutcome {
    if blacklist.iter().any(|u| u == user_id) {
        return FilterOutcome::Drop;
    }
    if !whitelist.is_empty() && !whitelist.iter().any(|u| u == user_id) {
        return FilterOutcome::Drop;
    }

    if is_dm {
        if respond_to_dms == Some(false) {
            return FilterOutcome::Drop;
        }
        return FilterOutcome::Accept { content: content.to_string() };
    }

    if let Some(allowed) = allowed_guilds {
        if !allowed.is_empty() && guild_id.is_some_and(|id| !allowed.contains(&id)) {
            return FilterOutcome::Drop;
        }
    }

    let requires_mention = require_mention.unwrap_or(true);
    if requires_mention && !content.contains(bot_mention) {
        return FilterOutcome::Drop;
    }

    let stripped = if content.contains(bot_mention) {
        content.replacen(bot_mention, "", 1).trim().to_string()
    } else {
        content.to_string()
    };

    FilterOutcome::Accept { content: stripped }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dm_never_requires_mention_even_if_configured() {
        let outcome = filter_inbound("U1", &[], &[], true, None, None, None, Some(true), "<@123>", "hi");
        assert_eq!(outcome, FilterOutcome::Accept { content: "hi".into() });
    }

    #[test]
    fn dm_is_dropped_when_respond_to_dms_is_false() {
        let outcome = filter_inbound("U1", &[], &[], true, None, None, Some(false), None, "<@123>", "hi");
        assert_eq!(outcome, FilterOutcome::Drop);
    }

    #[test]
    fn guild_message_outside_allow_list_is_dropped() {
        let outcome = filter_inbound(
            "U1", &[], &[], false, Some(9), Some(&[1, 2]), None, Some(false), "<@123>", "hi",
        );
        assert_eq!(outcome, FilterOutcome::Drop);
    }

    #[test]
    fn guild_message_without_mention_is_dropped_by_default() {
        let outcome = filter_inbound("U1", &[], &[], false, Some(1), None, None, None, "<@123>", "hi");
        assert_eq!(outcome, FilterOutcome::Drop);
    }

    #[test]
    fn guild_message_with_mention_is_accepted_and_stripped() {
        let outcome = filter_inbound(
            "U1", &[], &[], false, Some(1), None, None, None, "<@123>", "<@123> hi there",
        );
        assert_eq!(outcome, FilterOutcome::Accept { content: "hi there".into() });
    }

    #[test]
    fn blacklisted_user_is_dropped_even_in_a_dm() {
        let outcome = filter_inbound("U1", &[], &["U1".into()], true, None, None, None, None, "<@123>", "hi");
        assert_eq!(outcome, FilterOutcome::Drop);
    }
}
