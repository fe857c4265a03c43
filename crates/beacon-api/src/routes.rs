use axum::{
    Router,
    routing::{get, post, put},
};

use crate::state::AppState;
use crate::{feeds, messages, rules, values};

pub fn router(state: AppState) -> Router {
    let messages = Router::new()
        .route(
            "/api/de",
            get(messages::list_messages)
                .post(messages::ingest)
                .delete(messages::delete_all_messages),
        )
        .route("/api/de/search", get(messages::search))
        .route("/api/de/position/{id}", put(messages::update_position))
        .route(
            "/api/de/{id}",
            get(messages::get_message)
                .put(messages::update)
                .delete(messages::delete_message),
        );

    let rules = Router::new()
        .route("/api/rules", get(rules::list_rules).delete(rules::delete_all_rules))
        .route("/api/rules/{id}", get(rules::get_rule).delete(rules::delete_rule))
        .route(
            "/api/rules/feed",
            get(rules::list_feed_rules).post(rules::create_feed_rule),
        )
        .route(
            "/api/rules/feed/{id}",
            get(rules::get_rule)
                .put(rules::replace_rule_feeds)
                .delete(rules::clear_rule_feeds),
        )
        .route(
            "/api/rules/feed/{id}/feedid/{feedid}/feedvalue/{feedvalue}",
            put(rules::add_rule_feed).delete(rules::remove_rule_feed),
        )
        .route(
            "/api/rules/federation",
            get(rules::list_federation_rules).post(rules::create_federation_rule),
        )
        .route(
            "/api/rules/federation/{id}",
            get(rules::get_rule)
                .put(rules::put_federation_rule)
                .delete(rules::delete_federation_rule),
        );

    let feeds = Router::new()
        .route(
            "/api/feeds",
            get(feeds::list_feeds)
                .post(feeds::create_feed)
                .delete(feeds::delete_all_feeds),
        )
        .route("/api/feeds/byviewname/{name}", get(feeds::get_feed_by_view))
        .route("/api/feeds/{id}", get(feeds::get_feed).delete(feeds::delete_feed))
        .route("/api/viewcontent", get(feeds::all_content))
        .route("/api/viewcontent/{view}", get(feeds::view_content));

    let values = Router::new()
        .route("/api/values", get(values::list_values).delete(values::delete_all_values))
        .route("/api/values/list", post(values::create_list))
        .route("/api/values/list/{id}", get(values::get_list).delete(values::delete_list))
        .route("/api/values/value", post(values::create_value))
        .route(
            "/api/values/value/{id}",
            get(values::get_value).delete(values::delete_value),
        );

    Router::new()
        .merge(messages)
        .merge(rules)
        .merge(feeds)
        .merge(values)
        .with_state(state)
}
