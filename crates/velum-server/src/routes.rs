//! HTTP routes and their wire types.
//!
//! The wire carries proof material as decimal or hex strings, matching
//! what proving toolchains emit; parsing into core types happens here so
//! everything below the router works with typed values.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use velum_core::{Digest, Groth16Proof, PollDefinition, PublicSignals};
use velum_relay::{
    Ledger, PollResults, RelayError, RelayReceipt, RelayRequest, Relayer,
};
use velum_store::{PollStore, VoteStore};
use velum_tree::EligibilityProof;

/// Error wrapper mapping relay errors onto HTTP responses.
pub struct ApiError(RelayError);

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let status = match code {
            "POLL_NOT_FOUND" | "VOTER_NOT_REGISTERED" => StatusCode::NOT_FOUND,
            "INVALID_REQUEST" | "PROOF_REJECTED" => StatusCode::BAD_REQUEST,
            "INSUFFICIENT_FUNDS" | "RELAYER_NOT_CONFIGURED" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            tracing::error!(code, error = %self.0, "request failed");
        } else {
            tracing::debug!(code, error = %self.0, "request rejected");
        }
        let body = json!({ "error": { "code": code, "message": self.0.to_string() } });
        (status, Json(body)).into_response()
    }
}

/// Proof tuple as it arrives on the wire.
#[derive(Debug, Deserialize)]
pub struct ProofBody {
    /// G1 point `a`, two strings.
    pub a: Vec<String>,
    /// G2 point `b`, two pairs of strings.
    pub b: Vec<Vec<String>>,
    /// G1 point `c`, two strings.
    pub c: Vec<String>,
}

/// Vote relay request body.
#[derive(Debug, Deserialize)]
pub struct RelayBody {
    /// Application poll id.
    pub poll_id: String,
    /// Candidate index the ballot selects.
    pub candidate_index: u8,
    /// The Groth16 proof.
    pub proof: ProofBody,
    /// The four public signals, in circuit order.
    pub public_signals: Vec<String>,
}

/// Poll creation body.
#[derive(Debug, Deserialize)]
pub struct CreatePollBody {
    /// Application poll id (a UUID string).
    pub poll_id: String,
    /// Human-readable title.
    pub title: String,
    /// Candidate labels, in ballot order.
    pub candidates: Vec<String>,
    /// Voting window start, unix seconds.
    pub start_time: u64,
    /// Voting window end, unix seconds.
    pub end_time: u64,
    /// Optional pre-registered voter identities.
    #[serde(default)]
    pub voters: Vec<String>,
}

/// Voter registration body.
#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    /// Application poll id.
    pub poll_id: String,
    /// Voter identity secret, decimal or hex.
    pub identity: String,
}

/// Identity selector for the eligibility proof endpoint.
#[derive(Debug, Deserialize)]
pub struct ProofQuery {
    /// Voter identity secret, decimal or hex.
    pub identity: String,
}

/// Public view of a stored poll. Voter identities never leave the server;
/// only their count does.
#[derive(Debug, Serialize)]
pub struct PollView {
    /// Application poll id.
    pub poll_id: String,
    /// Human-readable title.
    pub title: String,
    /// Candidate labels.
    pub candidates: Vec<String>,
    /// Voting window start, unix seconds.
    pub start_time: u64,
    /// Voting window end, unix seconds.
    pub end_time: u64,
    /// Current eligibility root.
    pub eligibility_root: Digest,
    /// Number of registered voters.
    pub registered_voters: usize,
}

impl From<PollDefinition> for PollView {
    fn from(poll: PollDefinition) -> Self {
        Self {
            poll_id: poll.poll_id,
            title: poll.title,
            candidates: poll.candidates,
            start_time: poll.start_time,
            end_time: poll.end_time,
            eligibility_root: poll.eligibility_root,
            registered_voters: poll.registered_voters.len(),
        }
    }
}

/// Eligibility proof response.
#[derive(Debug, Serialize)]
pub struct ProofView {
    /// Root the proof verifies against.
    pub root: Digest,
    /// The membership proof.
    pub proof: EligibilityProof,
}

/// Builds the application router over a wired relayer.
pub fn build_router<L, S>(relayer: Arc<Relayer<L, S>>) -> Router
where
    L: Ledger + 'static,
    S: PollStore + VoteStore + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/api/relay", post(relay::<L, S>))
        .route("/api/polls", post(create_poll::<L, S>))
        .route("/api/polls/:poll_id", get(get_poll::<L, S>))
        .route("/api/polls/:poll_id/results", get(results::<L, S>))
        .route("/api/polls/:poll_id/merkle-proof", get(merkle_proof::<L, S>))
        .route("/api/voter/register", post(register_voter::<L, S>))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(relayer)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn relay<L, S>(
    State(relayer): State<Arc<Relayer<L, S>>>,
    Json(body): Json<RelayBody>,
) -> Result<Json<RelayReceipt>, ApiError>
where
    L: Ledger,
    S: PollStore + VoteStore,
{
    let request = RelayRequest {
        poll_id: body.poll_id,
        candidate_index: body.candidate_index,
        proof: Groth16Proof::parse(&body.proof.a, &body.proof.b, &body.proof.c)
            .map_err(RelayError::from)?,
        public_signals: PublicSignals::parse(&body.public_signals).map_err(RelayError::from)?,
    };
    Ok(Json(relayer.relay_vote(request).await?))
}

async fn create_poll<L, S>(
    State(relayer): State<Arc<Relayer<L, S>>>,
    Json(body): Json<CreatePollBody>,
) -> Result<(StatusCode, Json<PollView>), ApiError>
where
    L: Ledger,
    S: PollStore + VoteStore,
{
    let voters = body
        .voters
        .iter()
        .map(|s| Digest::from_numeric_str(s))
        .collect::<Result<Vec<_>, _>>()
        .map_err(RelayError::from)?;
    let poll = PollDefinition {
        poll_id: body.poll_id,
        title: body.title,
        candidates: body.candidates,
        start_time: body.start_time,
        end_time: body.end_time,
        eligibility_root: Digest::zero(),
        registered_voters: voters,
    };
    let stored = relayer.create_poll(poll).await?;
    Ok((StatusCode::CREATED, Json(stored.into())))
}

async fn get_poll<L, S>(
    State(relayer): State<Arc<Relayer<L, S>>>,
    Path(poll_id): Path<String>,
) -> Result<Json<PollView>, ApiError>
where
    L: Ledger,
    S: PollStore + VoteStore,
{
    Ok(Json(relayer.get_poll(&poll_id).await?.into()))
}

async fn results<L, S>(
    State(relayer): State<Arc<Relayer<L, S>>>,
    Path(poll_id): Path<String>,
) -> Result<Json<PollResults>, ApiError>
where
    L: Ledger,
    S: PollStore + VoteStore,
{
    Ok(Json(relayer.poll_results(&poll_id).await?))
}

async fn merkle_proof<L, S>(
    State(relayer): State<Arc<Relayer<L, S>>>,
    Path(poll_id): Path<String>,
    Query(query): Query<ProofQuery>,
) -> Result<Json<ProofView>, ApiError>
where
    L: Ledger,
    S: PollStore + VoteStore,
{
    let identity = Digest::from_numeric_str(&query.identity).map_err(RelayError::from)?;
    let (root, proof) = relayer.eligibility_proof(&poll_id, &identity).await?;
    Ok(Json(ProofView { root, proof }))
}

async fn register_voter<L, S>(
    State(relayer): State<Arc<Relayer<L, S>>>,
    Json(body): Json<RegisterBody>,
) -> Result<Json<PollView>, ApiError>
where
    L: Ledger,
    S: PollStore + VoteStore,
{
    let identity = Digest::from_numeric_str(&body.identity).map_err(RelayError::from)?;
    let poll = relayer.register_voter(&body.poll_id, identity).await?;
    Ok(Json(poll.into()))
}
