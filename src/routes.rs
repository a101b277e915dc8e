use crate::auth::{self, current_user, require_login};
use crate::avatar::{self, AvatarStore};
use crate::config::Config;
use crate::database::*;
use crate::error::AppError;
use crate::forms::*;
use crate::session::{self, flash, flash_all, page_context};
use actix_identity::Identity;
use actix_multipart::form::{tempfile::TempFile, text::Text, MultipartForm};
use actix_session::Session;
use actix_web::{http::header, web, HttpRequest, HttpResponse};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::io;

type Tera = web::Data<tera::Tera>;
type Db = web::Data<sled::Db>;
type Settings = web::Data<Config>;

type Response = Result<HttpResponse, AppError>;

const CREDENTIALS_NOT_CORRECT: &str = "Login credentials not correct";

fn redirect<L: AsRef<str>>(location: L) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location.as_ref()))
        .finish()
}

fn render(tera: &tera::Tera, template: &str, ctx: &tera::Context) -> Response {
    let body = tera.render(template, ctx)?;
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body))
}

fn movie_location(id: &str) -> String {
    format!("/movie/{}", id)
}

#[derive(Serialize, Deserialize)]
pub struct SearchParams {
    search: Option<String>,
}

async fn index(
    req: HttpRequest,
    identity: Option<Identity>,
    session: Session,
    params: web::Query<SearchParams>,
    tera: Tera,
    db: Db,
) -> Response {
    let user = current_user(identity, &db)?;
    let search = params
        .search
        .as_deref()
        .map(str::trim)
        .filter(|term| !term.is_empty());
    let movies = match search {
        Some(term) => db.search_movies(term)?,
        None => db.get_movies(&user.movies)?,
    };
    let mut ctx = page_context(&req, &session)?;
    ctx.insert("title", "Movies Watchlist");
    ctx.insert("movies", &movies);
    ctx.insert("search", search.unwrap_or(""));
    render(&tera, "index.html", &ctx)
}

fn render_register(req: &HttpRequest, session: &Session, tera: &tera::Tera, form: &RegisterForm) -> Response {
    let mut ctx = page_context(req, session)?;
    ctx.insert("title", "Movies Watchlist - Register");
    ctx.insert("form", form);
    render(tera, "register.html", &ctx)
}

async fn register(
    req: HttpRequest,
    identity: Option<Identity>,
    session: Session,
    tera: Tera,
    db: Db,
) -> Response {
    if current_user(identity, &db).is_ok() {
        return Ok(redirect("/"));
    }
    render_register(&req, &session, &tera, &RegisterForm::default())
}

async fn register_post(
    req: HttpRequest,
    identity: Option<Identity>,
    session: Session,
    form: web::Form<RegisterForm>,
    tera: Tera,
    db: Db,
    config: Settings,
) -> Response {
    if current_user(identity, &db).is_ok() {
        return Ok(redirect("/"));
    }
    if let Err(errors) = form.check() {
        flash_all(&session, "danger", errors)?;
        return render_register(&req, &session, &tera, &form);
    }
    match auth::register(&db, &form, config.password_cost)? {
        Some(_id) => {
            flash(&session, "success", "User registered successfully")?;
            Ok(redirect("/login"))
        }
        None => {
            flash(&session, "danger", "An account with this email already exists")?;
            render_register(&req, &session, &tera, &form)
        }
    }
}

fn render_login(req: &HttpRequest, session: &Session, tera: &tera::Tera, form: &LoginForm) -> Response {
    let mut ctx = page_context(req, session)?;
    ctx.insert("title", "Movies Watchlist - Login");
    ctx.insert("email_value", &form.email);
    render(tera, "login.html", &ctx)
}

async fn login(
    req: HttpRequest,
    identity: Option<Identity>,
    session: Session,
    tera: Tera,
    db: Db,
) -> Response {
    if current_user(identity, &db).is_ok() {
        return Ok(redirect("/"));
    }
    render_login(&req, &session, &tera, &LoginForm::default())
}

async fn login_post(
    req: HttpRequest,
    identity: Option<Identity>,
    session: Session,
    form: web::Form<LoginForm>,
    tera: Tera,
    db: Db,
) -> Response {
    if current_user(identity, &db).is_ok() {
        return Ok(redirect("/"));
    }
    if let Err(errors) = form.check() {
        flash_all(&session, "danger", errors)?;
        return render_login(&req, &session, &tera, &form);
    }
    match auth::authenticate(&db, &form.email, &form.password)? {
        Some(user) => {
            session::sign_in(&req, &session, &user)?;
            debug!("User {} logged in", user.id);
            Ok(redirect("/"))
        }
        None => {
            flash(&session, "danger", CREDENTIALS_NOT_CORRECT)?;
            Ok(redirect("/login"))
        }
    }
}

async fn logout(identity: Option<Identity>, session: Session) -> Response {
    session::sign_out(identity, &session)?;
    Ok(redirect("/"))
}

#[derive(MultipartForm)]
pub struct ProfileUpload {
    name: Option<Text<String>>,
    address: Option<Text<String>>,
    password: Option<Text<String>>,
    profile_picture: Option<TempFile>,
}

fn text(field: Option<Text<String>>) -> String {
    field.map(|text| text.0).unwrap_or_default()
}

fn render_profile(
    req: &HttpRequest,
    session: &Session,
    tera: &tera::Tera,
    user: &crate::model::User,
    form: &ProfileForm,
) -> Response {
    let mut ctx = page_context(req, session)?;
    ctx.insert("title", "Update Profile");
    ctx.insert("form", form);
    ctx.insert("profile_picture", &user.profile_picture);
    render(tera, "profile.html", &ctx)
}

async fn profile(
    req: HttpRequest,
    identity: Option<Identity>,
    session: Session,
    tera: Tera,
    db: Db,
) -> Response {
    let user = current_user(identity, &db)?;
    render_profile(&req, &session, &tera, &user, &ProfileForm::from_user(&user))
}

async fn profile_post(
    req: HttpRequest,
    identity: Option<Identity>,
    session: Session,
    MultipartForm(upload): MultipartForm<ProfileUpload>,
    tera: Tera,
    db: Db,
    config: Settings,
) -> Response {
    let mut user = current_user(identity, &db)?;
    let form = ProfileForm {
        name: text(upload.name),
        email: user.email.clone(),
        address: text(upload.address),
        password: text(upload.password),
    };
    if let Err(errors) = form.check() {
        flash_all(&session, "danger", errors)?;
        return render_profile(&req, &session, &tera, &user, &form);
    }

    user.name = form.name.trim().to_owned();
    user.address = form.address.trim().to_owned();
    if let Some(password) = form.new_password() {
        user.password_hash = auth::hash_password(password, config.password_cost)?;
    }

    if let Some(picture) = &upload.profile_picture {
        let original = picture.file_name.as_deref().unwrap_or("");
        if !original.is_empty() {
            if avatar::allowed_file(original) {
                let store = AvatarStore::new(config.upload_folder.clone());
                let stored =
                    store.replace(user.profile_picture.as_deref(), original, picture.file.path())?;
                if let Some(filename) = stored {
                    info!("User {} uploaded avatar {}", user.id, filename);
                    user.profile_picture = Some(filename);
                }
            } else {
                flash(
                    &session,
                    "warning",
                    format!(
                        "Profile picture must be one of: {}",
                        avatar::ALLOWED_EXTENSIONS.join(", ")
                    ),
                )?;
            }
        }
    }

    db.update_user(&user)?;
    flash(&session, "success", "Profile updated successfully")?;
    Ok(redirect("/profile"))
}

fn render_movie_form(
    req: &HttpRequest,
    session: &Session,
    tera: &tera::Tera,
    template: &str,
    title: &str,
    action: &str,
    form: &impl Serialize,
) -> Response {
    let mut ctx = page_context(req, session)?;
    ctx.insert("title", title);
    ctx.insert("action", action);
    ctx.insert("form", form);
    render(tera, template, &ctx)
}

async fn add_movie(
    req: HttpRequest,
    identity: Option<Identity>,
    session: Session,
    tera: Tera,
    db: Db,
) -> Response {
    current_user(identity, &db)?;
    render_movie_form(
        &req,
        &session,
        &tera,
        "new_movie.html",
        "Movies Watchlist - Add Movie",
        "/add",
        &MovieForm::default(),
    )
}

async fn add_movie_post(
    req: HttpRequest,
    identity: Option<Identity>,
    session: Session,
    form: web::Form<MovieForm>,
    tera: Tera,
    db: Db,
) -> Response {
    let user = current_user(identity, &db)?;
    let movie = match form.to_movie(generate_id()) {
        Ok(movie) => movie,
        Err(errors) => {
            flash_all(&session, "danger", errors)?;
            return render_movie_form(
                &req,
                &session,
                &tera,
                "new_movie.html",
                "Movies Watchlist - Add Movie",
                "/add",
                &form.0,
            );
        }
    };
    db.add_movie(&movie)?;
    db.push_movie(&user.id, &movie.id)?;
    info!("User {} added movie {}", user.id, movie.id);
    Ok(redirect(movie_location(&movie.id)))
}

async fn edit_movie(
    req: HttpRequest,
    identity: Option<Identity>,
    session: Session,
    path: web::Path<String>,
    tera: Tera,
    db: Db,
) -> Response {
    require_login(identity)?;
    let id = path.into_inner();
    let movie = db.get_movie(&id)?.ok_or(AppError::NotFound("Movie"))?;
    render_movie_form(
        &req,
        &session,
        &tera,
        "movie_form.html",
        &movie.title,
        &format!("/edit/{}", id),
        &ExtendedMovieForm::from_movie(&movie),
    )
}

async fn edit_movie_post(
    req: HttpRequest,
    identity: Option<Identity>,
    session: Session,
    path: web::Path<String>,
    form: web::Form<ExtendedMovieForm>,
    tera: Tera,
    db: Db,
) -> Response {
    require_login(identity)?;
    let id = path.into_inner();
    let mut movie = db.get_movie(&id)?.ok_or(AppError::NotFound("Movie"))?;
    if let Err(errors) = form.apply(&mut movie) {
        flash_all(&session, "danger", errors)?;
        return render_movie_form(
            &req,
            &session,
            &tera,
            "movie_form.html",
            &movie.title,
            &format!("/edit/{}", id),
            &form.0,
        );
    }
    db.update_movie(&movie)?;
    Ok(redirect(movie_location(&id)))
}

async fn movie(
    req: HttpRequest,
    session: Session,
    path: web::Path<String>,
    tera: Tera,
    db: Db,
) -> Response {
    let movie = db
        .get_movie(&path.into_inner())?
        .ok_or(AppError::NotFound("Movie"))?;
    let mut ctx = page_context(&req, &session)?;
    ctx.insert("title", &movie.title);
    ctx.insert("movie", &movie);
    render(&tera, "movie_details.html", &ctx)
}

#[derive(Serialize, Deserialize)]
pub struct RateParams {
    rating: u8,
}

async fn rate_movie(
    identity: Option<Identity>,
    path: web::Path<String>,
    params: web::Query<RateParams>,
    db: Db,
) -> Response {
    require_login(identity)?;
    let id = path.into_inner();
    db.rate_movie(&id, params.rating)?
        .ok_or(AppError::NotFound("Movie"))?;
    Ok(redirect(movie_location(&id)))
}

async fn watch_today(identity: Option<Identity>, path: web::Path<String>, db: Db) -> Response {
    require_login(identity)?;
    let id = path.into_inner();
    db.watch_movie(&id, chrono::Utc::now())?
        .ok_or(AppError::NotFound("Movie"))?;
    Ok(redirect(movie_location(&id)))
}

#[derive(Serialize, Deserialize)]
pub struct ThemeParams {
    current_page: Option<String>,
}

async fn toggle_theme(session: Session, params: web::Query<ThemeParams>) -> Response {
    let theme = session::toggle_theme(&session)?;
    debug!("Theme switched to {:?}", theme);
    Ok(redirect(session::local_target(params.current_page.as_deref())))
}

async fn uploaded_file(path: web::Path<String>, config: Settings) -> Response {
    let filename = path.into_inner();
    let store = AvatarStore::new(config.upload_folder.clone());
    match store.read(&filename) {
        Ok(data) => Ok(HttpResponse::Ok()
            .content_type(avatar::content_type(&filename))
            .body(data)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(AppError::NotFound("File")),
        Err(err) => Err(err.into()),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/", web::post().to(index))
        .route("/register", web::get().to(register))
        .route("/register", web::post().to(register_post))
        .route("/login", web::get().to(login))
        .route("/login", web::post().to(login_post))
        .route("/logout", web::get().to(logout))
        .route("/profile", web::get().to(profile))
        .route("/profile", web::post().to(profile_post))
        .route("/add", web::get().to(add_movie))
        .route("/add", web::post().to(add_movie_post))
        .route("/edit/{id}", web::get().to(edit_movie))
        .route("/edit/{id}", web::post().to(edit_movie_post))
        .route("/movie/{id}", web::get().to(movie))
        .route("/movie/{id}/rate", web::get().to(rate_movie))
        .route("/movie/{id}/watch", web::get().to(watch_today))
        .route("/toggle-theme", web::get().to(toggle_theme))
        .route("/uploads/{filename}", web::get().to(uploaded_file));
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::cookie::{Cookie, Key, SameSite};
    use actix_web::dev::ServiceResponse;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use std::path::PathBuf;

    const BOUNDARY: &str = "----watchlist-test-boundary";

    struct TestState {
        tera: Tera,
        db: Db,
        config: Settings,
        uploads: tempfile::TempDir,
    }

    impl TestState {
        fn new() -> Self {
            let uploads = tempfile::tempdir().unwrap();
            let config = Config {
                bind: "127.0.0.1:0".to_owned(),
                database: PathBuf::new(),
                upload_folder: uploads.path().join("avatars"),
                secret_key: None,
                secure_cookies: false,
                password_cost: 4,
            };
            TestState {
                tera: web::Data::new(crate::load_templates().unwrap()),
                db: web::Data::new(sled::Config::new().temporary(true).open().unwrap()),
                config: web::Data::new(config),
                uploads,
            }
        }

        fn user(&self, email: &str) -> crate::model::User {
            self.db.get_user_by_email(email).unwrap().unwrap()
        }
    }

    macro_rules! init_app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .wrap(session::identity_middleware())
                    .wrap(session::session_middleware(Key::generate(), false))
                    .app_data($state.tera.clone())
                    .app_data($state.db.clone())
                    .app_data($state.config.clone())
                    .configure(configure),
            )
            .await
        };
    }

    /// Sends a request carrying the session cookie in `$jar` and stores the
    /// cookie the response sets, like a browser would.
    macro_rules! send {
        ($app:expr, $jar:expr, $req:expr) => {{
            let mut req = $req;
            if let Some(cookie) = $jar.clone() {
                req = req.cookie(cookie);
            }
            let resp = test::call_service(&$app, req.to_request()).await;
            if let Some(cookie) = session_cookie(&resp) {
                let _ = $jar.replace(cookie);
            }
            resp
        }};
    }

    macro_rules! register_and_login {
        ($app:expr, $jar:expr, $email:expr) => {{
            let resp = send!(
                $app,
                $jar,
                test::TestRequest::post()
                    .uri("/register")
                    .set_form(&registration($email))
            );
            assert_eq!(location(&resp), "/login");
            let resp = send!(
                $app,
                $jar,
                test::TestRequest::post().uri("/login").set_form(&LoginForm {
                    email: $email.to_owned(),
                    password: "secret".to_owned(),
                })
            );
            assert_eq!(location(&resp), "/");
        }};
    }

    macro_rules! add_movie {
        ($app:expr, $jar:expr, $title:expr, $director:expr) => {{
            let resp = send!(
                $app,
                $jar,
                test::TestRequest::post().uri("/add").set_form(&MovieForm {
                    title: $title.to_owned(),
                    director: $director.to_owned(),
                    year: "1995".to_owned(),
                })
            );
            assert_eq!(resp.status(), StatusCode::FOUND);
            location(&resp).trim_start_matches("/movie/").to_owned()
        }};
    }

    fn session_cookie<B>(resp: &ServiceResponse<B>) -> Option<Cookie<'static>> {
        resp.response()
            .cookies()
            .find(|cookie| cookie.name() == session::SESSION_COOKIE)
            .map(Cookie::into_owned)
    }

    fn location<B>(resp: &ServiceResponse<B>) -> String {
        resp.headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_owned()
    }

    async fn body<B: actix_web::body::MessageBody>(resp: ServiceResponse<B>) -> String {
        String::from_utf8(test::read_body(resp).await.to_vec()).unwrap()
    }

    fn registration(email: &str) -> RegisterForm {
        RegisterForm {
            name: "Ada Lovelace".to_owned(),
            address: "12 Analytical Row".to_owned(),
            email: email.to_owned(),
            password: "secret".to_owned(),
            confirm_password: "secret".to_owned(),
        }
    }

    fn profile_upload(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> test::TestRequest {
        let mut payload = Vec::new();
        for (name, value) in fields {
            payload.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        if let Some((filename, data)) = file {
            payload.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"profile_picture\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    BOUNDARY, filename
                )
                .as_bytes(),
            );
            payload.extend_from_slice(data);
            payload.extend_from_slice(b"\r\n");
        }
        payload.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        test::TestRequest::post()
            .uri("/profile")
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            ))
            .set_payload(payload)
    }

    #[actix_rt::test]
    async fn anonymous_requests_are_sent_to_login() {
        let state = TestState::new();
        let app = init_app!(state);
        for uri in &[
            "/",
            "/add",
            "/profile",
            "/edit/some-id",
            "/movie/some-id/rate?rating=5",
            "/movie/some-id/watch",
        ] {
            let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(resp.status(), StatusCode::FOUND, "{}", uri);
            assert_eq!(location(&resp), "/login", "{}", uri);
        }
    }

    #[actix_rt::test]
    async fn registering_the_same_email_twice_fails() {
        let state = TestState::new();
        let app = init_app!(state);
        let mut jar: Option<Cookie<'static>> = None;

        let resp = send!(
            app,
            jar,
            test::TestRequest::post()
                .uri("/register")
                .set_form(&registration("ada@example.com"))
        );
        assert_eq!(location(&resp), "/login");
        let resp = send!(app, jar, test::TestRequest::get().uri("/login"));
        assert!(body(resp).await.contains("User registered successfully"));

        let resp = send!(
            app,
            jar,
            test::TestRequest::post()
                .uri("/register")
                .set_form(&registration("ada@example.com"))
        );
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body(resp).await.contains("An account with this email already exists"));
        assert_eq!(state.db.open_tree("users").unwrap().len(), 1);
    }

    #[actix_rt::test]
    async fn invalid_registration_is_reported_inline() {
        let state = TestState::new();
        let app = init_app!(state);
        let mut jar: Option<Cookie<'static>> = None;
        let mut form = registration("ada@example.com");
        form.confirm_password = "different".to_owned();

        let resp = send!(app, jar, test::TestRequest::post().uri("/register").set_form(&form));
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body(resp).await.contains("did not match"));
        assert!(state.db.get_user_by_email("ada@example.com").unwrap().is_none());
    }

    #[actix_rt::test]
    async fn failed_logins_look_the_same() {
        let state = TestState::new();
        let app = init_app!(state);
        let mut jar: Option<Cookie<'static>> = None;
        send!(
            app,
            jar,
            test::TestRequest::post()
                .uri("/register")
                .set_form(&registration("ada@example.com"))
        );

        let attempt = |email: &str| LoginForm {
            email: email.to_owned(),
            password: "wrong".to_owned(),
        };
        let wrong_password = send!(
            app,
            jar,
            test::TestRequest::post().uri("/login").set_form(&attempt("ada@example.com"))
        );
        let unknown_email = send!(
            app,
            jar,
            test::TestRequest::post().uri("/login").set_form(&attempt("bob@example.com"))
        );
        assert_eq!(wrong_password.status(), unknown_email.status());
        assert_eq!(location(&wrong_password), "/login");
        assert_eq!(location(&unknown_email), "/login");

        let resp = send!(app, jar, test::TestRequest::get().uri("/login"));
        assert!(body(resp).await.contains(CREDENTIALS_NOT_CORRECT));
        let resp = send!(app, jar, test::TestRequest::get().uri("/"));
        assert_eq!(location(&resp), "/login");
    }

    #[actix_rt::test]
    async fn added_movie_is_owned_and_viewable() {
        let state = TestState::new();
        let app = init_app!(state);
        let mut jar: Option<Cookie<'static>> = None;
        register_and_login!(app, jar, "ada@example.com");

        let id = add_movie!(app, jar, "Heat", "Michael Mann");
        assert_eq!(state.user("ada@example.com").movies, vec![id.clone()]);

        let resp = send!(app, jar, test::TestRequest::get().uri(&format!("/movie/{}", id)));
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body(resp).await.contains("Directed by Michael Mann"));

        let resp = send!(app, jar, test::TestRequest::get().uri("/"));
        assert!(body(resp).await.contains(&format!("/movie/{}", id)));
    }

    #[actix_rt::test]
    async fn invalid_movie_is_not_stored() {
        let state = TestState::new();
        let app = init_app!(state);
        let mut jar: Option<Cookie<'static>> = None;
        register_and_login!(app, jar, "ada@example.com");

        let resp = send!(
            app,
            jar,
            test::TestRequest::post().uri("/add").set_form(&MovieForm {
                title: "Arrival of a Train".to_owned(),
                director: "Lumière".to_owned(),
                year: "1850".to_owned(),
            })
        );
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body(resp).await.contains("Please enter a year in the format YYYY."));
        assert!(state.user("ada@example.com").movies.is_empty());
    }

    #[actix_rt::test]
    async fn rating_and_watching_persist() {
        let state = TestState::new();
        let app = init_app!(state);
        let mut jar: Option<Cookie<'static>> = None;
        register_and_login!(app, jar, "ada@example.com");
        let id = add_movie!(app, jar, "Heat", "Michael Mann");

        let resp = send!(
            app,
            jar,
            test::TestRequest::get().uri(&format!("/movie/{}/rate?rating=5", id))
        );
        assert_eq!(location(&resp), format!("/movie/{}", id));
        let resp = send!(app, jar, test::TestRequest::get().uri(&format!("/movie/{}/watch", id)));
        assert_eq!(location(&resp), format!("/movie/{}", id));

        let movie = state.db.get_movie(&id).unwrap().unwrap();
        assert_eq!(movie.rating, 5);
        assert!(movie.last_watched.is_some());
        let resp = send!(app, jar, test::TestRequest::get().uri(&format!("/movie/{}", id)));
        assert!(body(resp).await.contains("Last watched"));

        let resp = send!(app, jar, test::TestRequest::get().uri("/movie/missing/rate?rating=5"));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_rt::test]
    async fn rating_must_be_an_integer() {
        let state = TestState::new();
        let app = init_app!(state);
        let mut jar: Option<Cookie<'static>> = None;
        register_and_login!(app, jar, "ada@example.com");
        let id = add_movie!(app, jar, "Heat", "Michael Mann");

        for query in &["", "?rating=abc", "?rating=4.5", "?rating=-1", "?rating=300"] {
            let uri = format!("/movie/{}/rate{}", id, query);
            let resp = send!(app, jar, test::TestRequest::get().uri(&uri));
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", uri);
        }
        assert_eq!(state.db.get_movie(&id).unwrap().unwrap().rating, 0);
    }

    #[actix_rt::test]
    async fn signed_in_users_skip_login_and_register() {
        let state = TestState::new();
        let app = init_app!(state);
        let mut jar: Option<Cookie<'static>> = None;
        register_and_login!(app, jar, "ada@example.com");

        for uri in &["/register", "/login"] {
            let resp = send!(app, jar, test::TestRequest::get().uri(uri));
            assert_eq!(resp.status(), StatusCode::FOUND, "{}", uri);
            assert_eq!(location(&resp), "/", "{}", uri);
        }
        let resp = send!(
            app,
            jar,
            test::TestRequest::post().uri("/login").set_form(&LoginForm {
                email: "ada@example.com".to_owned(),
                password: "wrong".to_owned(),
            })
        );
        assert_eq!(location(&resp), "/");
        let resp = send!(
            app,
            jar,
            test::TestRequest::post()
                .uri("/register")
                .set_form(&registration("bob@example.com"))
        );
        assert_eq!(location(&resp), "/");
        assert!(state.db.get_user_by_email("bob@example.com").unwrap().is_none());
    }

    #[actix_rt::test]
    async fn session_cookie_is_same_site_strict() {
        let state = TestState::new();
        let app = init_app!(state);
        let mut jar: Option<Cookie<'static>> = None;
        register_and_login!(app, jar, "ada@example.com");

        let cookie = jar.unwrap();
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.http_only(), Some(true));
    }

    #[actix_rt::test]
    async fn unknown_upload_is_not_found() {
        let state = TestState::new();
        let app = init_app!(state);
        for uri in &["/uploads/missing.png", "/uploads/.hidden", "/uploads/..%2Fsecret.png"] {
            let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{}", uri);
        }
    }

    #[actix_rt::test]
    async fn script_video_link_is_not_stored() {
        let state = TestState::new();
        let app = init_app!(state);
        let mut jar: Option<Cookie<'static>> = None;
        register_and_login!(app, jar, "ada@example.com");
        let id = add_movie!(app, jar, "Heat", "Michael Mann");

        let mut form = ExtendedMovieForm::from_movie(&state.db.get_movie(&id).unwrap().unwrap());
        form.video_link = "javascript:alert(document.cookie)".to_owned();
        let resp = send!(
            app,
            jar,
            test::TestRequest::post()
                .uri(&format!("/edit/{}", id))
                .set_form(&form)
        );
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body(resp).await.contains("Video link must be an http or https URL."));
        assert_eq!(state.db.get_movie(&id).unwrap().unwrap().video_link, "");
    }

    #[actix_rt::test]
    async fn editing_replaces_fields() {
        let state = TestState::new();
        let app = init_app!(state);
        let mut jar: Option<Cookie<'static>> = None;
        register_and_login!(app, jar, "ada@example.com");
        let id = add_movie!(app, jar, "Heat", "Mann");

        let resp = send!(app, jar, test::TestRequest::get().uri(&format!("/edit/{}", id)));
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = send!(
            app,
            jar,
            test::TestRequest::post()
                .uri(&format!("/edit/{}", id))
                .set_form(&ExtendedMovieForm {
                    title: "Heat".to_owned(),
                    director: "Michael Mann".to_owned(),
                    year: "1995".to_owned(),
                    cast: "Al Pacino\nRobert De Niro".to_owned(),
                    series: String::new(),
                    tags: "crime\nthriller".to_owned(),
                    description: "A heist movie.".to_owned(),
                    video_link: "https://example.com/heat".to_owned(),
                })
        );
        assert_eq!(location(&resp), format!("/movie/{}", id));

        let movie = state.db.get_movie(&id).unwrap().unwrap();
        assert_eq!(movie.director, "Michael Mann");
        assert_eq!(movie.cast, vec!["Al Pacino", "Robert De Niro"]);
        assert_eq!(movie.tags, vec!["crime", "thriller"]);
        assert_eq!(movie.video_link, "https://example.com/heat");

        let resp = send!(app, jar, test::TestRequest::get().uri("/edit/missing"));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = send!(app, jar, test::TestRequest::get().uri("/movie/missing"));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_rt::test]
    async fn search_spans_every_users_movies() {
        let state = TestState::new();
        let app = init_app!(state);
        let mut ada: Option<Cookie<'static>> = None;
        let mut bob: Option<Cookie<'static>> = None;
        register_and_login!(app, ada, "ada@example.com");
        register_and_login!(app, bob, "bob@example.com");
        let heat = add_movie!(app, ada, "Heat", "Michael Mann");
        let alien = add_movie!(app, bob, "Alien", "Ridley Scott");

        let listing = body(send!(app, bob, test::TestRequest::get().uri("/"))).await;
        assert!(listing.contains(&alien));
        assert!(!listing.contains(&heat));

        let found = body(send!(app, bob, test::TestRequest::get().uri("/?search=MANN"))).await;
        assert!(found.contains(&heat));
        assert!(!found.contains(&alien));
    }

    #[actix_rt::test]
    async fn theme_survives_logout() {
        let state = TestState::new();
        let app = init_app!(state);
        let mut jar: Option<Cookie<'static>> = None;
        register_and_login!(app, jar, "ada@example.com");

        let resp = send!(
            app,
            jar,
            test::TestRequest::get().uri("/toggle-theme?current_page=%2Fprofile")
        );
        assert_eq!(location(&resp), "/profile");
        let resp = send!(app, jar, test::TestRequest::get().uri("/profile"));
        assert!(body(resp).await.contains("<body class=\"dark\">"));

        let resp = send!(app, jar, test::TestRequest::get().uri("/logout"));
        assert_eq!(location(&resp), "/");
        let resp = send!(app, jar, test::TestRequest::get().uri("/"));
        assert_eq!(location(&resp), "/login");
        let resp = send!(app, jar, test::TestRequest::get().uri("/login"));
        assert!(body(resp).await.contains("<body class=\"dark\">"));

        let resp = send!(
            app,
            jar,
            test::TestRequest::get().uri("/toggle-theme?current_page=https://example.com")
        );
        assert_eq!(location(&resp), "/");
        let resp = send!(app, jar, test::TestRequest::get().uri("/login"));
        assert!(body(resp).await.contains("<body class=\"light\">"));
    }

    #[actix_rt::test]
    async fn profile_update_replaces_avatar() {
        let state = TestState::new();
        let app = init_app!(state);
        let mut jar: Option<Cookie<'static>> = None;
        register_and_login!(app, jar, "ada@example.com");
        let avatars = state.uploads.path().join("avatars");

        let resp = send!(
            app,
            jar,
            profile_upload(
                &[("name", "Ada King"), ("address", "Ockham Park"), ("password", "")],
                Some(("portrait.png", &b"png-bytes"[..])),
            )
        );
        assert_eq!(location(&resp), "/profile");
        let user = state.user("ada@example.com");
        assert_eq!(user.name, "Ada King");
        assert_eq!(user.address, "Ockham Park");
        let first = user.profile_picture.unwrap();
        assert!(first.ends_with("_portrait.png"));
        assert!(avatars.join(&first).exists());

        let resp = send!(app, jar, test::TestRequest::get().uri(&format!("/uploads/{}", first)));
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/png"
        );

        let resp = send!(
            app,
            jar,
            profile_upload(
                &[("name", "Ada King"), ("address", "Ockham Park"), ("password", "")],
                Some(("portrait.gif", &b"gif-bytes"[..])),
            )
        );
        assert_eq!(location(&resp), "/profile");
        let second = state.user("ada@example.com").profile_picture.unwrap();
        assert_ne!(first, second);
        assert!(!avatars.join(&first).exists());
        assert!(avatars.join(&second).exists());
    }

    #[actix_rt::test]
    async fn disallowed_avatar_leaves_existing_one() {
        let state = TestState::new();
        let app = init_app!(state);
        let mut jar: Option<Cookie<'static>> = None;
        register_and_login!(app, jar, "ada@example.com");

        send!(
            app,
            jar,
            profile_upload(
                &[("name", "Ada"), ("address", "Ockham Park"), ("password", "")],
                Some(("portrait.jpg", &b"jpg-bytes"[..])),
            )
        );
        let before = state.user("ada@example.com").profile_picture;
        assert!(before.is_some());

        let resp = send!(
            app,
            jar,
            profile_upload(
                &[("name", "Ada Lovelace"), ("address", "Ockham Park"), ("password", "")],
                Some(("payload.exe", &b"MZ"[..])),
            )
        );
        assert_eq!(location(&resp), "/profile");
        let user = state.user("ada@example.com");
        assert_eq!(user.profile_picture, before);
        assert_eq!(user.name, "Ada Lovelace");

        let resp = send!(app, jar, test::TestRequest::get().uri("/profile"));
        assert!(body(resp).await.contains("Profile picture must be one of"));
    }

    #[actix_rt::test]
    async fn password_changes_only_when_given() {
        let state = TestState::new();
        let app = init_app!(state);
        let mut jar: Option<Cookie<'static>> = None;
        register_and_login!(app, jar, "ada@example.com");
        let original = state.user("ada@example.com").password_hash;

        send!(
            app,
            jar,
            profile_upload(&[("name", "Ada"), ("address", "Ockham Park"), ("password", "")], None)
        );
        assert_eq!(state.user("ada@example.com").password_hash, original);

        send!(
            app,
            jar,
            profile_upload(
                &[("name", "Ada"), ("address", "Ockham Park"), ("password", "babbage")],
                None
            )
        );
        let user = state.user("ada@example.com");
        assert_ne!(user.password_hash, original);
        assert!(auth::verify_password("babbage", &user.password_hash).unwrap());
    }
}
