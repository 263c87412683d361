use std::time::Duration;

use actix_web::cookie::{Cookie, SameSite};
use actix_web::{get, middleware, post, web, App, HttpRequest, HttpResponse, HttpServer};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::controller::Controller;
use crate::error::AppError;
use crate::session::{SessionState, SessionStore, SharedSession};
use crate::view::Page;

pub const SESSION_COOKIE: &str = "nlsql_session";

pub struct AppState {
    pub controller: Controller,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(controller: Controller, session_ttl: Duration) -> Self {
        Self {
            controller,
            sessions: SessionStore::new(session_ttl),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QuestionForm {
    #[serde(default)]
    pub question: String,
}

#[get("/")]
async fn index(data: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    let (id, session) = session_for(&data, &req);
    let state = session.lock().await;

    page_response(id, &state, "", None)
}

#[post("/submit")]
async fn submit(
    data: web::Data<AppState>,
    req: HttpRequest,
    form: web::Form<QuestionForm>,
) -> HttpResponse {
    let (id, session) = session_for(&data, &req);
    let mut state = session.lock().await;

    let error = data
        .controller
        .submit(&mut state, &form.question)
        .await
        .err();

    page_response(id, &state, &form.question, error.as_ref())
}

#[post("/run")]
async fn run_query(
    data: web::Data<AppState>,
    req: HttpRequest,
    form: web::Form<QuestionForm>,
) -> HttpResponse {
    let (id, session) = session_for(&data, &req);
    let mut state = session.lock().await;

    if !data.controller.run(&mut state).await {
        debug!(session = %id, "Run requested without a query");
    }

    page_response(id, &state, &form.question, None)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(index).service(submit).service(run_query);
}

pub async fn serve(state: web::Data<AppState>, bind: &str) -> std::io::Result<()> {
    info!("Listening on http://{}", bind);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind(bind)?
    .run()
    .await
}

fn session_for(data: &AppState, req: &HttpRequest) -> (Uuid, SharedSession) {
    let known = req
        .cookie(SESSION_COOKIE)
        .and_then(|c| Uuid::parse_str(c.value()).ok());

    let (id, session) = data.sessions.get_or_create(known);
    if known != Some(id) {
        debug!(session = %id, total = data.sessions.len(), "Started new session");
    }
    (id, session)
}

fn page_response(
    id: Uuid,
    state: &SessionState,
    user_input: &str,
    error: Option<&AppError>,
) -> HttpResponse {
    let html = Page {
        state,
        user_input,
        error,
    }
    .render();

    let cookie = Cookie::build(SESSION_COOKIE, id.to_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish();

    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .cookie(cookie)
        .body(html)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use actix_web::body::MessageBody;
    use actix_web::dev::ServiceResponse;
    use actix_web::test;
    use async_trait::async_trait;

    use super::*;
    use crate::chain::Chain;
    use crate::database::{QueryExecutor, EXECUTION_ERROR_PLACEHOLDER};
    use crate::error::Result;
    use crate::session::DEFAULT_SESSION_TTL;
    use crate::text_to_sql_chain::parse_final_answer;

    /// Treats the question itself as raw model output.
    struct EchoChain;

    #[async_trait]
    impl Chain for EchoChain {
        async fn run(&self, input: &str) -> Result<String> {
            parse_final_answer(input)
        }
    }

    #[derive(Default)]
    struct FakeDatabase {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl QueryExecutor for FakeDatabase {
        async fn execute(&self, query: &str) -> String {
            self.seen.lock().unwrap().push(query.to_string());
            if query.contains("NoSuchTable") {
                EXECUTION_ERROR_PLACEHOLDER.to_string()
            } else {
                "(8)".to_string()
            }
        }
    }

    fn app_state(db: Arc<FakeDatabase>) -> web::Data<AppState> {
        web::Data::new(AppState::new(
            Controller::new(Arc::new(EchoChain), db),
            DEFAULT_SESSION_TTL,
        ))
    }

    fn session_cookie<B>(resp: &ServiceResponse<B>) -> Cookie<'static> {
        resp.response()
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE)
            .expect("session cookie")
            .into_owned()
    }

    async fn body_text<B: MessageBody>(resp: ServiceResponse<B>) -> String {
        let bytes = test::read_body(resp).await;
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[actix_web::test]
    async fn first_visit_shows_empty_page() {
        let app = test::init_service(
            App::new()
                .app_data(app_state(Arc::default()))
                .configure(configure),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert!(resp.status().is_success());
        let cookie = session_cookie(&resp);
        assert!(Uuid::parse_str(cookie.value()).is_ok());

        let body = body_text(resp).await;
        assert!(body.contains("Natural Language to SQL Converter"));
        assert!(body.contains("id=\"query_submit\" disabled>Run query"));
    }

    #[actix_web::test]
    async fn submit_then_run_in_one_session() {
        let db = Arc::new(FakeDatabase::default());
        let app = test::init_service(
            App::new()
                .app_data(app_state(db.clone()))
                .configure(configure),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        let cookie = session_cookie(&resp);

        let req = test::TestRequest::post()
            .uri("/submit")
            .cookie(cookie.clone())
            .set_form(&[("question", "First draft: x\nFinal answer: SELECT COUNT(*) FROM \"Employee\"")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(session_cookie(&resp).value(), cookie.value());
        let body = body_text(resp).await;
        assert!(body.contains("SELECT COUNT(*) FROM &quot;Employee&quot;</textarea>"));
        assert!(body.contains("id=\"query_submit\">Run query"));
        assert!(body.contains("id=\"result_box\" readonly></textarea>"));

        let req = test::TestRequest::post()
            .uri("/run")
            .cookie(cookie.clone())
            .set_form(&[("question", "")])
            .to_request();
        let body = body_text(test::call_service(&app, req).await).await;
        assert!(body.contains("id=\"result_box\" readonly>(8)</textarea>"));

        assert_eq!(
            *db.seen.lock().unwrap(),
            vec!["SELECT COUNT(*) FROM \"Employee\"".to_string()]
        );
    }

    #[actix_web::test]
    async fn run_without_query_is_noop() {
        let db = Arc::new(FakeDatabase::default());
        let app = test::init_service(
            App::new()
                .app_data(app_state(db.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/run")
            .set_form(&[("question", "")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body = body_text(resp).await;
        assert!(body.contains("id=\"query_submit\" disabled>Run query"));
        assert!(db.seen.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn generation_error_is_shown_and_state_kept() {
        let app = test::init_service(
            App::new()
                .app_data(app_state(Arc::default()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/submit")
            .set_form(&[("question", "Final answer: SELECT 1")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        let cookie = session_cookie(&resp);

        let req = test::TestRequest::post()
            .uri("/submit")
            .cookie(cookie)
            .set_form(&[("question", "no marker here")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body = body_text(resp).await;
        assert!(body.contains("role=\"alert\""));
        assert!(body.contains("readonly>SELECT 1</textarea>"));
        assert!(body.contains("value=\"no marker here\""));
    }

    #[actix_web::test]
    async fn execution_error_shows_placeholder() {
        let app = test::init_service(
            App::new()
                .app_data(app_state(Arc::default()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/submit")
            .set_form(&[("question", "Final answer: SELECT * FROM NoSuchTable")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        let cookie = session_cookie(&resp);

        let req = test::TestRequest::post()
            .uri("/run")
            .cookie(cookie)
            .set_form(&[("question", "")])
            .to_request();
        let body = body_text(test::call_service(&app, req).await).await;
        assert!(body.contains("readonly>An error occurred :(</textarea>"));
    }

    #[actix_web::test]
    async fn sessions_do_not_share_state() {
        let app = test::init_service(
            App::new()
                .app_data(app_state(Arc::default()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/submit")
            .set_form(&[("question", "Final answer: SELECT 1")])
            .to_request();
        test::call_service(&app, req).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        let body = body_text(resp).await;
        assert!(body.contains("id=\"query_submit\" disabled>Run query"));
    }
}
