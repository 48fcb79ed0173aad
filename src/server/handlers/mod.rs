use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;

use crate::server::AppState;

mod admin_logs;
mod applications;
pub(crate) mod auth;
mod auth_jwt;
mod gigs;
mod messages;
mod milestones;
mod payments;
mod profiles;
mod reviews;
mod subscriptions;
mod webhooks;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(auth_jwt::register))
        .route("/auth/login", post(auth_jwt::login))
        .route("/auth/me", get(auth_jwt::me))
        .route("/users/me", put(profiles::update_me))
        .route("/users/{id}", get(profiles::get_profile))
        .route("/users/{id}/reviews", get(reviews::list_for_user))
        .route("/gigs", get(gigs::list_gigs).post(gigs::create_gig))
        .route(
            "/gigs/{id}",
            get(gigs::get_gig)
                .put(gigs::update_gig)
                .delete(gigs::delete_gig),
        )
        .route("/gigs/{id}/feature", post(gigs::feature_gig))
        .route(
            "/gigs/{id}/applications",
            get(applications::list_for_gig).post(applications::apply),
        )
        .route("/applications/{id}/accept", post(applications::accept))
        .route("/applications/{id}/reject", post(applications::reject))
        .route("/applications/{id}/withdraw", post(applications::withdraw))
        .route("/messages", post(messages::send))
        .route("/conversations", get(messages::list_conversations))
        .route("/conversations/{peer_id}", get(messages::get_conversation))
        .route("/conversations/{peer_id}/read", post(messages::mark_read))
        .route("/reviews", post(reviews::create_review))
        .route("/payments/intent", post(payments::create_intent))
        .route("/me/payments", get(payments::my_payments))
        .route("/escrow/{id}/release", post(payments::release_escrow))
        .route("/escrow/{id}/dispute", post(payments::dispute_escrow))
        .route(
            "/gigs/{id}/milestones",
            get(milestones::list_milestones).post(milestones::create_milestone),
        )
        .route("/milestones/{id}/pay", post(milestones::pay_milestone))
        .route("/subscriptions/me", get(subscriptions::my_subscription))
        .route("/subscriptions/checkout", post(subscriptions::checkout))
        .route("/webhooks/payments", post(webhooks::receive))
        .route("/admin/logs", get(admin_logs::recent_logs))
}
