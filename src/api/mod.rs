use std::sync::Arc;

use axum::{
    Router,
    extract::{
        FromRequest, FromRequestParts, Json, Path, Query, Request, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, HeaderValue, StatusCode, header, request::Parts},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::admin::{self, ContactForm};
use crate::auth::{self, RegistrationForm, SessionManager};
use crate::bank::{self, LoanApplication, QUICK_ADD_AMOUNTS, TransferRequest};
use crate::config::Config;
use crate::core::stats::{
    MonitorFilter, MonthlyFlow, RecentBar, SortOrder, TransactionSummary, TypeFilter,
    UserFilter, filter_and_sort, monthly_flow, recent_bars, summarize,
};
use crate::core::{
    AccountType, Comparison, EmiBreakdown, EmiComparison, EmiRequest, LoanStatus, Preferences,
    PublicUser, SchedulePoint, TermUnit, Transaction, User, UserStatus, breakdown, compare,
    remaining_principal_schedule,
};
use crate::error::{Error, Result};
use crate::store::JsonStore;

const INDEX_HTML: &str = include_str!("../../web/index.html");
const STYLES_CSS: &str = include_str!("../../web/styles.css");
const APP_JS: &str = include_str!("../../web/app.js");

const RECENT_BAR_COUNT: usize = 5;

const DEFAULT_EMI_PRINCIPAL: f64 = 1_000_000.0;
const DEFAULT_EMI_RATE: f64 = 8.5;
const DEFAULT_EMI_YEARS: f64 = 20.0;

/// Shared handler state. Every store mutation runs under `writes`, so the
/// JSON files never see two writers at once.
#[derive(Clone)]
pub struct AppState {
    store: JsonStore,
    writes: Arc<Mutex<()>>,
    sessions: Arc<Mutex<SessionManager>>,
    config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let store = JsonStore::open(config.storage.data_dir.clone())?;
        let sessions = SessionManager::new(config.security.session_timeout());
        Ok(Self {
            store,
            writes: Arc::new(Mutex::new(())),
            sessions: Arc::new(Mutex::new(sessions)),
            config: Arc::new(config),
        })
    }

    /// Runs read-only store work on the blocking pool.
    async fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&JsonStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(&store)).await?
    }

    /// Runs a store mutation on the blocking pool. The write lock travels
    /// with the task and is released only when the task finishes.
    async fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&JsonStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let writes = Arc::clone(&self.writes).lock_owned().await;
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || {
            let _writes = writes;
            f(&store)
        })
        .await?
    }

    async fn user_id(&self, headers: &HeaderMap) -> Result<String> {
        let token = bearer(headers).ok_or(Error::Unauthorized)?;
        self.sessions.lock().await.touch(token, Utc::now())
    }

    async fn current_user(&self, headers: &HeaderMap) -> Result<User> {
        let user_id = self.user_id(headers).await?;
        self.read(move |store| store.load_user(&user_id))
            .await?
            .ok_or(Error::Unauthorized)
    }

    async fn admin(&self, headers: &HeaderMap) -> Result<String> {
        let token = bearer(headers).ok_or(Error::Unauthorized)?;
        self.sessions.lock().await.check_admin(token, Utc::now())
    }
}

/// Handler error carrying a crate error to the JSON error body.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        if self.0.is_internal() {
            error!(error = %self.0, "request failed");
            return error_response(status, "Internal server error");
        }
        error_response(status, &self.0.to_string())
    }
}

type ApiResult = std::result::Result<Response, ApiError>;

/// `Json` body whose rejection is reported like any other bad input.
struct ApiJson<T>(T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| Error::validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// `Query` string whose rejection is reported like any other bad input.
struct ApiQuery<T>(T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: QueryRejection| Error::validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginPayload {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OtpPayload {
    otp_token: String,
    #[serde(default)]
    otp: String,
}

#[derive(Debug, Deserialize)]
struct ResetPayload {
    email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct EmiPayload {
    principal: Option<f64>,
    #[serde(alias = "rate")]
    annual_rate: Option<f64>,
    term: Option<f64>,
    term_unit: Option<TermUnit>,
    compare: Option<Comparison>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TransactionsQuery {
    account: usize,
    #[serde(rename = "type")]
    kind: TypeFilter,
    sort: SortOrder,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AccountQuery {
    account: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepositPayload {
    #[serde(default)]
    account: usize,
    amount: f64,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordPayload {
    current_password: String,
    new_password: String,
    confirm_password: String,
}

#[derive(Debug, Deserialize)]
struct TwoFactorPayload {
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct AdminLoginPayload {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct UserStatusPayload {
    status: UserStatus,
}

#[derive(Debug, Deserialize)]
struct LoanDecisionPayload {
    status: LoanStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchQuery {
    q: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    otp_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    otp_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<PublicUser>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisteredResponse {
    user_id: String,
    account_number: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    #[serde(flatten)]
    user: PublicUser,
    first_name: String,
    total_balance: f64,
    quick_add_amounts: [f64; 3],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmiResponse {
    months: u32,
    #[serde(flatten)]
    breakdown: EmiBreakdown,
    #[serde(skip_serializing_if = "Option::is_none")]
    comparison: Option<EmiComparison>,
    schedule: Vec<SchedulePoint>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransactionsResponse {
    account_number: String,
    account_type: AccountType,
    balance: f64,
    transactions: Vec<Transaction>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResponse {
    account_number: String,
    balance: f64,
    summary: TransactionSummary,
    recent: Vec<RecentBar>,
    monthly: Vec<MonthlyFlow>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub async fn run_http_server(config: Config) -> Result<()> {
    let addr = config.bind_address();
    let port = config.server.port;
    if config.admin.credentials.is_empty() {
        tracing::warn!("no admin credentials configured; the admin console is unreachable");
    }
    let app = router(AppState::new(config)?);

    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "Nuvana Bank listening");
    info!("Local access: http://127.0.0.1:{port}/");

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/index.html", get(index_handler))
        .route("/styles.css", get(styles_handler))
        .route("/app.js", get(app_js_handler))
        .route("/api/register", post(register_handler))
        .route("/api/login", post(login_handler))
        .route("/api/login/otp", post(otp_verify_handler))
        .route("/api/login/otp/resend", post(otp_resend_handler))
        .route("/api/login/otp/cancel", post(otp_cancel_handler))
        .route("/api/password/reset", post(password_reset_handler))
        .route("/api/contact", post(contact_handler))
        .route("/api/emi", get(emi_get_handler).post(emi_post_handler))
        .route("/api/me", get(me_handler))
        .route("/api/logout", post(logout_handler))
        .route("/api/transactions", get(transactions_handler))
        .route("/api/transactions/summary", get(summary_handler))
        .route("/api/transfer", post(transfer_handler))
        .route("/api/deposit", post(deposit_handler))
        .route("/api/loans", get(loans_handler).post(loan_apply_handler))
        .route("/api/settings/password", post(change_password_handler))
        .route("/api/settings/2fa", post(two_factor_handler))
        .route("/api/settings/preferences", post(preferences_handler))
        .route("/api/admin/login", post(admin_login_handler))
        .route("/api/admin/logout", post(admin_logout_handler))
        .route("/api/admin/overview", get(admin_overview_handler))
        .route("/api/admin/users", get(admin_users_handler))
        .route("/api/admin/users.csv", get(admin_users_csv_handler))
        .route("/api/admin/users/:id", get(admin_user_detail_handler))
        .route("/api/admin/users/:id/status", post(admin_user_status_handler))
        .route(
            "/api/admin/users/:id/loans/:loan_id",
            post(admin_loan_decision_handler),
        )
        .route("/api/admin/transactions", get(admin_transactions_handler))
        .route("/api/admin/messages", get(admin_messages_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

async fn index_handler() -> impl IntoResponse {
    with_cache_control(Html(INDEX_HTML))
}

async fn styles_handler() -> impl IntoResponse {
    with_cache_control((
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        STYLES_CSS,
    ))
}

async fn app_js_handler() -> impl IntoResponse {
    with_cache_control((
        [(
            header::CONTENT_TYPE,
            "application/javascript; charset=utf-8",
        )],
        APP_JS,
    ))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

// --- public -----------------------------------------------------------------

async fn register_handler(
    State(state): State<AppState>,
    ApiJson(form): ApiJson<RegistrationForm>,
) -> ApiResult {
    let now = Utc::now();
    let config = Arc::clone(&state.config);
    let user = state
        .write(move |store| {
            let user = auth::register(store, form, &config.security, now)?;
            store.log_activity(
                &user.user_id,
                "registration",
                json!({ "email": user.email }),
                now,
            );
            Ok(user)
        })
        .await?;
    Ok(json_response(
        StatusCode::CREATED,
        RegisteredResponse {
            account_number: user.primary_account().map(|a| a.account_number.clone()),
            user_id: user.user_id,
        },
    ))
}

async fn login_handler(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginPayload>,
) -> ApiResult {
    let now = Utc::now();
    let config = Arc::clone(&state.config);
    let user = state
        .write(move |store| {
            auth::login(
                store,
                &payload.email,
                &payload.password,
                &config.security,
                now,
            )
        })
        .await?;

    if user.security.two_factor_enabled {
        let otp = auth::generate_otp(state.config.security.otp_length);
        auth::send_otp(&user.email, &otp);
        let otp_token = state
            .sessions
            .lock()
            .await
            .begin_otp(&user.user_id, otp, now);
        return Ok(json_response(
            StatusCode::OK,
            LoginResponse {
                otp_required: true,
                otp_token: Some(otp_token),
                token: None,
                user: None,
            },
        ));
    }
    start_session(&state, user, "password", now).await
}

async fn start_session(
    state: &AppState,
    user: User,
    method: &'static str,
    now: DateTime<Utc>,
) -> ApiResult {
    let token = state.sessions.lock().await.create(&user.user_id, now);
    let user_id = user.user_id.clone();
    state
        .write(move |store| {
            store.log_activity(&user_id, "login", json!({ "method": method }), now);
            Ok(())
        })
        .await?;
    info!(user_id = %user.user_id, method, "user logged in");
    Ok(json_response(
        StatusCode::OK,
        LoginResponse {
            otp_required: false,
            otp_token: None,
            token: Some(token),
            user: Some(user.into()),
        },
    ))
}

async fn otp_verify_handler(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<OtpPayload>,
) -> ApiResult {
    let now = Utc::now();
    let user_id = state
        .sessions
        .lock()
        .await
        .complete_otp(&payload.otp_token, &payload.otp, now)?;
    let user = state
        .read(move |store| store.load_user(&user_id))
        .await?
        .ok_or(Error::UserNotFound)?;
    start_session(&state, user, "2fa", now).await
}

async fn otp_resend_handler(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<OtpPayload>,
) -> ApiResult {
    let otp = auth::generate_otp(state.config.security.otp_length);
    let user_id = state
        .sessions
        .lock()
        .await
        .resend_otp(&payload.otp_token, otp.clone(), Utc::now())?;
    let user = state
        .read(move |store| store.load_user(&user_id))
        .await?
        .ok_or(Error::UserNotFound)?;
    auth::send_otp(&user.email, &otp);
    Ok(json_response(StatusCode::OK, json!({ "sent": true })))
}

async fn otp_cancel_handler(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<OtpPayload>,
) -> Response {
    let cancelled = state.sessions.lock().await.cancel_otp(&payload.otp_token);
    json_response(StatusCode::OK, json!({ "cancelled": cancelled }))
}

async fn password_reset_handler(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ResetPayload>,
) -> ApiResult {
    let now = Utc::now();
    state
        .write(move |store| auth::reset_password(store, &payload.email, now))
        .await?;
    Ok(json_response(
        StatusCode::OK,
        json!({ "message": "A temporary password has been sent to your email" }),
    ))
}

async fn contact_handler(
    State(state): State<AppState>,
    ApiJson(form): ApiJson<ContactForm>,
) -> ApiResult {
    state
        .write(move |store| admin::submit_contact(store, form, Utc::now()))
        .await?;
    Ok(json_response(
        StatusCode::CREATED,
        json!({ "message": "Thank you for your message. We'll get back to you soon." }),
    ))
}

async fn emi_get_handler(ApiQuery(payload): ApiQuery<EmiPayload>) -> ApiResult {
    emi_handler_impl(payload)
}

async fn emi_post_handler(ApiJson(payload): ApiJson<EmiPayload>) -> ApiResult {
    emi_handler_impl(payload)
}

fn emi_handler_impl(payload: EmiPayload) -> ApiResult {
    let request = EmiRequest {
        principal: payload.principal.unwrap_or(DEFAULT_EMI_PRINCIPAL),
        annual_rate: payload.annual_rate.unwrap_or(DEFAULT_EMI_RATE),
        term: payload.term.unwrap_or(DEFAULT_EMI_YEARS),
        unit: payload.term_unit.unwrap_or_default(),
    };
    request.validate()?;

    let result = breakdown(request.principal, request.annual_rate, request.years());
    let schedule = remaining_principal_schedule(
        request.principal,
        request.annual_rate,
        request.years(),
        result.emi,
    );
    Ok(json_response(
        StatusCode::OK,
        EmiResponse {
            months: request.months(),
            breakdown: result,
            comparison: payload.compare.map(|scenario| compare(&request, scenario)),
            schedule,
        },
    ))
}

// --- signed-in user ---------------------------------------------------------

async fn me_handler(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    let user = state.current_user(&headers).await?;
    Ok(json_response(
        StatusCode::OK,
        ProfileResponse {
            first_name: user.first_name().to_string(),
            total_balance: user.total_balance(),
            quick_add_amounts: QUICK_ADD_AMOUNTS,
            user: user.into(),
        },
    ))
}

async fn logout_handler(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    let token = bearer(&headers).ok_or(Error::Unauthorized)?;
    let user_id = state.sessions.lock().await.remove(token);
    if let Some(user_id) = user_id {
        state
            .write(move |store| {
                store.log_activity(&user_id, "logout", serde_json::Value::Null, Utc::now());
                Ok(())
            })
            .await?;
    }
    Ok(json_response(StatusCode::OK, json!({ "loggedOut": true })))
}

async fn transactions_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<TransactionsQuery>,
) -> ApiResult {
    let user = state.current_user(&headers).await?;
    let account = user
        .accounts
        .get(query.account)
        .ok_or(Error::AccountNotFound)?;
    Ok(json_response(
        StatusCode::OK,
        TransactionsResponse {
            account_number: account.account_number.clone(),
            account_type: account.account_type,
            balance: account.balance,
            transactions: filter_and_sort(&account.transactions, query.kind, query.sort),
        },
    ))
}

async fn summary_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<AccountQuery>,
) -> ApiResult {
    let user = state.current_user(&headers).await?;
    let account = user
        .accounts
        .get(query.account)
        .ok_or(Error::AccountNotFound)?;
    Ok(json_response(
        StatusCode::OK,
        SummaryResponse {
            account_number: account.account_number.clone(),
            balance: account.balance,
            summary: summarize(&account.transactions),
            recent: recent_bars(&account.transactions, RECENT_BAR_COUNT),
            monthly: monthly_flow(&account.transactions),
        },
    ))
}

async fn transfer_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<TransferRequest>,
) -> ApiResult {
    let user_id = state.user_id(&headers).await?;
    let debit = state
        .write(move |store| bank::transfer_funds(store, &user_id, &payload, Utc::now()))
        .await?;
    Ok(json_response(StatusCode::OK, debit))
}

async fn deposit_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<DepositPayload>,
) -> ApiResult {
    let user_id = state.user_id(&headers).await?;
    let credit = state
        .write(move |store| {
            bank::deposit(
                store,
                &user_id,
                payload.account,
                payload.amount,
                &payload.description,
                Utc::now(),
            )
        })
        .await?;
    Ok(json_response(StatusCode::OK, credit))
}

async fn loans_handler(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    let user = state.current_user(&headers).await?;
    Ok(json_response(StatusCode::OK, user.loans))
}

async fn loan_apply_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<LoanApplication>,
) -> ApiResult {
    let user_id = state.user_id(&headers).await?;
    let loan = state
        .write(move |store| bank::apply_for_loan(store, &user_id, &payload, Utc::now()))
        .await?;
    Ok(json_response(StatusCode::CREATED, loan))
}

async fn change_password_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<PasswordPayload>,
) -> ApiResult {
    let user_id = state.user_id(&headers).await?;
    if payload.new_password != payload.confirm_password {
        return Err(Error::validation("Passwords do not match").into());
    }
    let now = Utc::now();
    let config = Arc::clone(&state.config);
    state
        .write(move |store| {
            auth::change_password(
                store,
                &user_id,
                &payload.current_password,
                &payload.new_password,
                &config.security,
                now,
            )?;
            store.log_activity(&user_id, "password_change", serde_json::Value::Null, now);
            Ok(())
        })
        .await?;
    Ok(json_response(
        StatusCode::OK,
        json!({ "message": "Password updated successfully" }),
    ))
}

async fn two_factor_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<TwoFactorPayload>,
) -> ApiResult {
    let user_id = state.user_id(&headers).await?;
    let enabled = payload.enabled;
    state
        .write(move |store| {
            auth::set_two_factor(store, &user_id, enabled)?;
            store.log_activity(
                &user_id,
                "2fa_update",
                json!({ "enabled": enabled }),
                Utc::now(),
            );
            Ok(())
        })
        .await?;
    Ok(json_response(
        StatusCode::OK,
        json!({ "twoFactorEnabled": enabled }),
    ))
}

async fn preferences_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<Preferences>,
) -> ApiResult {
    let user_id = state.user_id(&headers).await?;
    let saved = state
        .write(move |store| auth::update_preferences(store, &user_id, payload))
        .await?;
    Ok(json_response(StatusCode::OK, saved))
}

// --- admin ------------------------------------------------------------------

async fn admin_login_handler(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<AdminLoginPayload>,
) -> ApiResult {
    auth::admin_login(
        &state.config.admin.credentials,
        &payload.username,
        &payload.password,
    )?;
    let token = state
        .sessions
        .lock()
        .await
        .create_admin(&payload.username, Utc::now());
    info!(username = %payload.username, "admin logged in");
    Ok(json_response(StatusCode::OK, json!({ "token": token })))
}

async fn admin_logout_handler(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    let token = bearer(&headers).ok_or(Error::Unauthorized)?;
    state.sessions.lock().await.remove_admin(token);
    Ok(json_response(StatusCode::OK, json!({ "loggedOut": true })))
}

async fn admin_overview_handler(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    state.admin(&headers).await?;
    let overview = state.read(admin::overview).await?;
    Ok(json_response(StatusCode::OK, overview))
}

async fn admin_users_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(filter): ApiQuery<UserFilter>,
) -> ApiResult {
    state.admin(&headers).await?;
    let users = state
        .read(move |store| admin::list_users(store, &filter))
        .await?;
    Ok(json_response(StatusCode::OK, users))
}

async fn admin_users_csv_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(filter): ApiQuery<UserFilter>,
) -> ApiResult {
    state.admin(&headers).await?;
    let csv = state
        .read(move |store| admin::users_csv(store, &filter))
        .await?;
    Ok(with_cache_control((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"user_data.csv\"",
            ),
        ],
        csv,
    )))
}

async fn admin_user_detail_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> ApiResult {
    state.admin(&headers).await?;
    let detail = state
        .read(move |store| admin::user_detail(store, &user_id))
        .await?;
    Ok(json_response(StatusCode::OK, detail))
}

async fn admin_user_status_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    ApiJson(payload): ApiJson<UserStatusPayload>,
) -> ApiResult {
    state.admin(&headers).await?;
    let status = payload.status;
    let target = user_id.clone();
    state
        .write(move |store| admin::set_user_status(store, &target, status, Utc::now()))
        .await?;
    if status == UserStatus::Blocked {
        state.sessions.lock().await.revoke_user(&user_id);
    }
    Ok(json_response(
        StatusCode::OK,
        json!({ "userId": user_id, "status": status }),
    ))
}

async fn admin_loan_decision_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((user_id, loan_id)): Path<(String, String)>,
    ApiJson(payload): ApiJson<LoanDecisionPayload>,
) -> ApiResult {
    state.admin(&headers).await?;
    let loan = state
        .write(move |store| {
            admin::set_loan_status(store, &user_id, &loan_id, payload.status, Utc::now())
        })
        .await?;
    Ok(json_response(StatusCode::OK, loan))
}

async fn admin_transactions_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(filter): ApiQuery<MonitorFilter>,
) -> ApiResult {
    state.admin(&headers).await?;
    let today = Utc::now().date_naive();
    let monitor = state
        .read(move |store| admin::transactions(store, &filter, today))
        .await?;
    Ok(json_response(StatusCode::OK, monitor))
}

async fn admin_messages_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> ApiResult {
    state.admin(&headers).await?;
    let messages = state
        .read(move |store| admin::contact_messages(store, query.q.as_deref()))
        .await?;
    Ok(json_response(StatusCode::OK, messages))
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}
