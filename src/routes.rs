use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use crate::auth::{require_auth, TokenIssuer};
use crate::db::DbConnection;
use crate::files::FileStore;
use crate::handlers;
use crate::texts::TextStore;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: DbConnection,
    pub files: FileStore,
    pub texts: TextStore,
    pub tokens: Arc<TokenIssuer>,
}

impl AppState {
    pub fn new(db: DbConnection, tokens: TokenIssuer, base_url: String, bcrypt_cost: u32) -> Self {
        Self {
            files: FileStore {
                conn: db.clone(),
                bcrypt_cost,
            },
            texts: TextStore {
                conn: db.clone(),
                base_url,
                bcrypt_cost,
            },
            db,
            tokens: Arc::new(tokens),
        }
    }
}

/// Build the route table. With `auth_required`, creating, updating and
/// deleting artifacts needs a valid bearer token.
pub fn router(state: AppState, auth_required: bool) -> Router {
    let open = Router::new()
        .route("/", get(handlers::root))
        .route("/jwt", post(handlers::issue_token))
        .route("/users", post(handlers::register_user))
        .route("/upload", get(handlers::list_files))
        .route("/uploads", get(handlers::list_owner_files))
        .route("/uploads/:id", get(handlers::get_file))
        .route("/upload/private", post(handlers::check_file_password))
        .route("/texts", get(handlers::list_texts))
        .route("/text/:id", get(handlers::get_text))
        .route("/texts/private", post(handlers::check_text_password));

    let mut mutating = Router::new()
        .route("/upload", post(handlers::create_file))
        .route(
            "/uploads/:id",
            put(handlers::update_file).delete(handlers::delete_file),
        )
        .route("/save-text", post(handlers::save_text))
        .route("/text/:id", put(handlers::update_text))
        .route("/texts/:id", delete(handlers::delete_text));

    if auth_required {
        mutating = mutating.route_layer(middleware::from_fn_with_state(
            state.tokens.clone(),
            require_auth,
        ));
    }

    open.merge(mutating).with_state(state)
}
