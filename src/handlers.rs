// src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::feed::Feed;
use crate::models::{Choice, Reaction};
use crate::presentation::{
    dashboard, poll_panel, reaction_panel, DashboardView, Notice, PollPanel, ReactionPanel,
};
use crate::services::{AppState, Dashboard, Session};
use crate::vote::{VoteController, VoteOutcome};

#[derive(Deserialize)]
pub struct VisitorQuery {
    pub visitor_id: Uuid,
}

#[derive(Deserialize)]
pub struct ReactionRequest {
    pub visitor_id: Uuid,
    pub reaction: Reaction,
}

#[derive(Deserialize)]
pub struct PollVoteRequest {
    pub visitor_id: Uuid,
    pub option: usize,
}

#[derive(Serialize)]
pub struct VoteResponse<P> {
    pub recorded: bool,
    pub panel: P,
}

fn ready(state: &AppState) -> Result<&Dashboard, ApiError> {
    state
        .dashboard
        .as_ref()
        .map_err(|reason| ApiError::FeedUnavailable(reason.clone()))
}

fn poll_controller(session: &Session) -> Result<&VoteController, ApiError> {
    session.poll.as_ref().ok_or(ApiError::PollNotActive)
}

async fn load_reaction_panel(controller: &VoteController) -> ReactionPanel {
    let state = controller.state().await;
    let totals = controller.totals().await;
    reaction_panel(state, &totals, Notice::on_load(state), controller.is_busy())
}

async fn load_poll_panel(dashboard: &Dashboard, controller: &VoteController) -> Result<PollPanel, ApiError> {
    let poll = dashboard.votes.poll().ok_or(ApiError::PollNotActive)?;
    let state = controller.state().await;
    let totals = controller.totals().await;
    Ok(poll_panel(poll, state, &totals, Notice::on_load(state), controller.is_busy()))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    match &state.dashboard {
        Ok(dashboard) => Json(json!({
            "status": "ok",
            "backend": dashboard.votes.backend_kind(),
        })),
        Err(reason) => Json(json!({
            "status": "degraded",
            "error": reason,
        })),
    }
}

pub async fn get_feed(State(state): State<Arc<AppState>>) -> Result<Json<Feed>, ApiError> {
    Ok(Json(ready(&state)?.feed.clone()))
}

pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    query: Result<Query<VisitorQuery>, QueryRejection>,
) -> Result<Json<DashboardView>, ApiError> {
    let dashboard_state = ready(&state)?;
    let Query(query) = query?;
    let session = dashboard_state.votes.session(query.visitor_id);

    let reactions = load_reaction_panel(&session.reaction).await;
    let poll = match &session.poll {
        Some(controller) => Some(load_poll_panel(dashboard_state, controller).await?),
        None => None,
    };

    Ok(Json(dashboard(&dashboard_state.feed, reactions, poll)))
}

pub async fn get_reactions(
    State(state): State<Arc<AppState>>,
    query: Result<Query<VisitorQuery>, QueryRejection>,
) -> Result<Json<ReactionPanel>, ApiError> {
    let votes = &ready(&state)?.votes;
    let Query(query) = query?;
    let session = votes.session(query.visitor_id);
    Ok(Json(load_reaction_panel(&session.reaction).await))
}

pub async fn post_reaction(
    State(state): State<Arc<AppState>>,
    request: Result<Json<ReactionRequest>, JsonRejection>,
) -> Result<Json<VoteResponse<ReactionPanel>>, ApiError> {
    let votes = &ready(&state)?.votes;
    let Json(request) = request?;
    let session = votes.session(request.visitor_id);
    let controller = &session.reaction;

    let outcome = controller
        .cast_vote(Choice::Reaction(request.reaction))
        .await?;

    let (recorded, notice, totals) = match &outcome {
        VoteOutcome::Recorded { totals, .. } => (true, Notice::Thanks, totals.clone()),
        VoteOutcome::AlreadyVoted { .. } => (false, Notice::RepeatAttempt, controller.totals().await),
    };

    Ok(Json(VoteResponse {
        recorded,
        panel: reaction_panel(outcome.state(), &totals, Some(notice), controller.is_busy()),
    }))
}

pub async fn get_poll(
    State(state): State<Arc<AppState>>,
    query: Result<Query<VisitorQuery>, QueryRejection>,
) -> Result<Json<PollPanel>, ApiError> {
    let dashboard_state = ready(&state)?;
    let Query(query) = query?;
    let session = dashboard_state.votes.session(query.visitor_id);
    let controller = poll_controller(&session)?;
    Ok(Json(load_poll_panel(dashboard_state, controller).await?))
}

pub async fn post_poll_vote(
    State(state): State<Arc<AppState>>,
    request: Result<Json<PollVoteRequest>, JsonRejection>,
) -> Result<Json<VoteResponse<PollPanel>>, ApiError> {
    let dashboard_state = ready(&state)?;
    let poll = dashboard_state.votes.poll().ok_or(ApiError::PollNotActive)?;
    let Json(request) = request?;
    let session = dashboard_state.votes.session(request.visitor_id);
    let controller = poll_controller(&session)?;

    let outcome = controller.cast_vote(Choice::Poll(request.option)).await?;

    let (recorded, notice, totals) = match &outcome {
        VoteOutcome::Recorded { totals, .. } => (true, Notice::Thanks, totals.clone()),
        VoteOutcome::AlreadyVoted { .. } => (false, Notice::RepeatAttempt, controller.totals().await),
    };

    Ok(Json(VoteResponse {
        recorded,
        panel: poll_panel(poll, outcome.state(), &totals, Some(notice), controller.is_busy()),
    }))
}
