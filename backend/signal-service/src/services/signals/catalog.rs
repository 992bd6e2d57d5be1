//! Fixed signal catalog: 30 base signals plus 77 extended signals.

use crate::models::SignalDefinition;

const fn signal(event_type: &'static str, base_weight: f64) -> SignalDefinition {
    SignalDefinition {
        event_type,
        base_weight,
    }
}

/// Core reading, navigation, commerce and feedback signals
pub const BASE_SIGNALS: [SignalDefinition; 30] = [
    signal("page_view", 1.0),
    signal("dwell_time", 2.0),
    signal("scroll_depth", 1.5),
    signal("read_completion", 4.0),
    signal("content_revisit", 3.0),
    signal("click_read_more", 1.5),
    signal("text_selection", 1.0),
    signal("copy_text", 2.0),
    signal("media_play", 2.0),
    signal("internal_link_click", 1.5),
    signal("search_query", 0.5),
    signal("search_click", 2.0),
    signal("related_post_click", 2.5),
    signal("category_browse_deep", 1.5),
    signal("tag_explore", 1.0),
    signal("product_view", 1.5),
    signal("add_to_cart", 5.0),
    signal("add_to_wishlist", 4.0),
    signal("purchase_complete", 10.0),
    signal("product_review", 5.0),
    signal("product_rating", 3.0),
    signal("cross_sell_click", 2.0),
    signal("product_tab_switch", 0.5),
    signal("like", 3.0),
    signal("dislike", -3.0),
    signal("bookmark_save", 4.0),
    signal("bookmark_remove", -2.0),
    signal("session_start", 0.0),
    signal("return_visitor", 1.0),
    signal("recommendation_impression", 0.0),
];

pub const EXTENDED_SIGNALS: [SignalDefinition; 77] = [
    // Content
    signal("multi_revisit", 6.0),
    signal("expand_content", 1.5),
    signal("image_interaction", 1.5),
    signal("media_completion", 5.0),
    signal("download_resource", 4.0),
    signal("print_page", 2.0),
    signal("code_copy", 3.0),
    signal("outbound_link_click", 0.5),
    // Navigation
    signal("archive_browse", 0.5),
    signal("pagination_advance", 1.5),
    signal("breadcrumb_navigate", 0.5),
    signal("author_archive_visit", 2.5),
    signal("back_button_return", 2.0),
    signal("archive_browse_no_click", -1.0),
    signal("search_no_click", -0.5),
    signal("random_navigation", 1.0),
    // Commerce
    signal("remove_from_cart", -3.0),
    signal("checkout_start", 7.0),
    signal("checkout_abandon", -5.0),
    signal("subscription_signup", 8.0),
    signal("refund_request", -6.0),
    signal("reorder", 7.0),
    signal("product_compare", 2.0),
    signal("gallery_view", 1.5),
    signal("coupon_apply", 2.0),
    signal("variation_select", 1.0),
    signal("quantity_change", 1.5),
    signal("product_qa", 3.0),
    signal("helpful_vote", 2.0),
    signal("cart_abandon", -4.0),
    signal("checkout_complete", 9.0),
    // Social
    signal("native_share", 6.0),
    signal("social_click", 4.0),
    signal("copy_link", 3.0),
    signal("email_share", 5.0),
    signal("private_share", 4.0),
    signal("comment_upvote", 2.0),
    signal("mention_author", 3.0),
    signal("share_cancel", -0.5),
    signal("reshare", 5.0),
    // Explicit feedback
    signal("multi_react", 4.0),
    signal("weighted_like", 3.0),
    signal("star_rating", 2.0),
    signal("follow_author", 5.0),
    signal("unfollow_author", -3.0),
    signal("subscribe_category", 4.0),
    signal("unsubscribe_category", -2.0),
    signal("newsletter_signup", 5.0),
    signal("collection_add", 4.0),
    signal("premium_reaction", 6.0),
    // Negative / disengagement
    signal("bounce", -3.0),
    signal("pogo_stick", -4.0),
    signal("fast_scroll", -2.0),
    signal("dismiss", -3.0),
    signal("reduce_affinity", -2.0),
    signal("hide_post", -5.0),
    signal("mute_author", -6.0),
    signal("block_author", -8.0),
    signal("report_content", -7.0),
    signal("close_widget", -1.0),
    signal("rage_quit", -5.0),
    signal("ad_blocker", 0.0),
    signal("cart_abandon_final", -4.0),
    // Session context
    signal("session_depth", 0.0),
    signal("session_duration", 0.0),
    signal("referral_source", 0.0),
    signal("device_type", 0.0),
    signal("time_of_day", 0.0),
    signal("day_of_week", 0.0),
    signal("logged_in_context", 0.0),
    signal("first_visit", 1.0),
    signal("tab_visibility", 0.0),
    signal("scroll_direction", 0.0),
    signal("idle_detection", -0.5),
    signal("font_size_change", 0.0),
    signal("reader_mode", 2.0),
    signal("recommendation_ctr", 0.0),
];

/// Disengagement signals counted by insights
pub const NEGATIVE_SIGNAL_TYPES: [&str; 11] = [
    "bounce",
    "pogo_stick",
    "fast_scroll",
    "dismiss",
    "hide_post",
    "mute_author",
    "block_author",
    "report_content",
    "close_widget",
    "rage_quit",
    "cart_abandon_final",
];

/// Sharing signals counted by insights
pub const SOCIAL_SIGNAL_TYPES: [&str; 6] = [
    "native_share",
    "social_click",
    "copy_link",
    "email_share",
    "private_share",
    "reshare",
];

pub const ESCALATING_SIGNAL: &str = "multi_revisit";
pub const GRADED_SIGNAL: &str = "star_rating";
pub const REACTION_SIGNAL: &str = "multi_react";

/// Reactions accepted by `multi_react`
pub const REACTION_TYPES: [&str; 3] = ["celebrate", "insightful", "curious"];

pub fn base_signal_types() -> impl Iterator<Item = &'static str> {
    BASE_SIGNALS.iter().map(|s| s.event_type)
}
