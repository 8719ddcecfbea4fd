#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::module_inception)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::Result;
    use axum::http::StatusCode;
    use axum_test::{TestResponse, TestServer};
    use cookie::{Cookie, Key};
    use serde_json::Value;

    use crate::config::GuardedRoute;
    use crate::store::Database;
    use crate::views::SkeletonRenderer;

    use crate::http::auth::SESSION_COOKIE;
    use crate::http::{router, AppState, SessionStore};

    fn test_server(admin_only: &[GuardedRoute]) -> Result<TestServer> {
        let state = AppState {
            db: Arc::new(Database::open_in_memory()?),
            sessions: SessionStore::new(Duration::from_secs(3600)),
            cookie_key: Key::generate(),
            renderer: Arc::new(SkeletonRenderer),
            admin_only_routes: Arc::new(admin_only.iter().copied().collect::<BTreeSet<_>>()),
        };
        Ok(TestServer::new(router(state))?)
    }

    /// Pull the JSON context out of a page produced by the skeleton renderer.
    fn view_context(response: &TestResponse) -> Value {
        let html = response.text();
        let start_marker = "id=\"view-context\">";
        let start = html.find(start_marker).map(|i| i + start_marker.len());
        let json = start.and_then(|start| {
            html[start..]
                .find("</script>")
                .map(|end| &html[start..start + end])
        });
        json.and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or(Value::Null)
    }

    fn listed_names(context: &Value) -> Vec<String> {
        context
            .get("cafes")
            .and_then(Value::as_array)
            .map(|cafes| {
                cafes
                    .iter()
                    .filter_map(|cafe| cafe.get("name").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn cafe_fields<'a>(name: &'a str, location: &'a str) -> Vec<(&'static str, &'a str)> {
        vec![
            ("name", name),
            ("map_url", "https://maps.example.com/cafe"),
            ("img_url", "https://images.example.com/cafe.jpg"),
            ("location", location),
            ("seats", "20-30"),
            ("has_wifi", "y"),
            ("has_sockets", "y"),
            ("coffee_price", "£2.50"),
        ]
    }

    async fn add_cafe(server: &TestServer, name: &str, location: &str) -> TestResponse {
        server.post("/add").form(&cafe_fields(name, location)).await
    }

    async fn signup(server: &TestServer, name: &str, email: &str, password: &str) -> TestResponse {
        server
            .post("/signup")
            .form(&[("name", name), ("email", email), ("password", password)])
            .await
    }

    async fn first_cafe_id(server: &TestServer) -> i64 {
        let response = server.get("/random").await;
        let body: Value = response.json();
        body.pointer("/cafe/id").and_then(Value::as_i64).unwrap_or(-1)
    }

    #[tokio::test]
    async fn root_redirects_to_listing() -> Result<()> {
        let server = test_server(&[])?;
        let response = server.get("/").await;
        assert_eq!(response.status_code(), StatusCode::FOUND);
        assert_eq!(response.header("location"), "/all");
        Ok(())
    }

    #[tokio::test]
    async fn health_reports_cafe_count() -> Result<()> {
        let server = test_server(&[])?;
        add_cafe(&server, "Artisan", "Peckham").await;

        let response = server.get("/health").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(body.get("status"), Some(&Value::String("ok".into())));
        assert_eq!(body.get("cafes"), Some(&Value::Number(1_i64.into())));
        Ok(())
    }

    #[tokio::test]
    async fn listing_is_sorted_and_names_each_cafe_once() -> Result<()> {
        let server = test_server(&[])?;
        for name in ["Zeitgeist", "Artisan", "Mare Street"] {
            let response = add_cafe(&server, name, "London").await;
            assert_eq!(response.status_code(), StatusCode::FOUND);
            assert_eq!(response.header("location"), "/all");
        }

        let response = server.get("/all").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let context = view_context(&response);
        assert_eq!(
            listed_names(&context),
            ["Artisan", "Mare Street", "Zeitgeist"]
        );
        assert_eq!(context.get("logged_in"), Some(&Value::Bool(false)));
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_cafe_name_is_a_conflict() -> Result<()> {
        let server = test_server(&[])?;
        add_cafe(&server, "Artisan", "Peckham").await;

        let response = add_cafe(&server, "Artisan", "Somewhere Else").await;
        assert_eq!(response.status_code(), StatusCode::CONFLICT);
        let body: Value = response.json();
        assert_eq!(
            body.pointer("/error/field").and_then(Value::as_str),
            Some("name")
        );

        let listing = view_context(&server.get("/all").await);
        assert_eq!(listed_names(&listing), ["Artisan"]);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_cafe_form_is_rerendered_with_errors() -> Result<()> {
        let server = test_server(&[])?;
        let response = server
            .post("/add")
            .form(&[
                ("name", "Artisan"),
                ("map_url", "not a url"),
                ("img_url", "https://images.example.com/a.jpg"),
                ("location", ""),
                ("seats", "10"),
                ("coffee_price", "£2"),
            ])
            .await;

        assert_eq!(response.status_code(), StatusCode::OK);
        assert!(response.text().contains("data-template=\"add_cafe.html\""));
        let context = view_context(&response);
        assert_eq!(
            context.pointer("/errors/map_url/0").and_then(Value::as_str),
            Some("Invalid URL.")
        );
        assert_eq!(
            context.pointer("/errors/location/0").and_then(Value::as_str),
            Some("This field is required.")
        );
        assert_eq!(
            context.pointer("/form/name").and_then(Value::as_str),
            Some("Artisan")
        );

        let listing = view_context(&server.get("/all").await);
        assert!(listed_names(&listing).is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn add_form_page_renders_empty_form() -> Result<()> {
        let server = test_server(&[])?;
        let response = server.get("/add").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let context = view_context(&response);
        assert_eq!(context.get("errors"), Some(&Value::Object(Default::default())));
        assert_eq!(
            context.pointer("/form/name").and_then(Value::as_str),
            Some("")
        );
        Ok(())
    }

    #[tokio::test]
    async fn random_cafe_on_empty_directory_is_not_found() -> Result<()> {
        let server = test_server(&[])?;
        let response = server.get("/random").await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert!(body.pointer("/error/Not Found").is_some());
        Ok(())
    }

    #[tokio::test]
    async fn random_cafe_returns_every_column() -> Result<()> {
        let server = test_server(&[])?;
        add_cafe(&server, "Artisan", "Peckham").await;

        let response = server.get("/random").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body: Value = response.json();
        let cafe = body.get("cafe").cloned().unwrap_or(Value::Null);
        assert_eq!(cafe.get("name").and_then(Value::as_str), Some("Artisan"));
        assert_eq!(cafe.get("has_wifi"), Some(&Value::Bool(true)));
        assert_eq!(cafe.get("has_toilet"), Some(&Value::Bool(false)));
        assert_eq!(
            cafe.get("coffee_price").and_then(Value::as_str),
            Some("£2.50")
        );
        assert_eq!(cafe.get("author_id"), Some(&Value::Null));
        for column in ["id", "map_url", "img_url", "location", "seats", "has_sockets", "can_take_calls"] {
            assert!(cafe.get(column).is_some(), "missing column {column}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn cafe_detail_renders_known_and_unknown_ids() -> Result<()> {
        let server = test_server(&[])?;
        add_cafe(&server, "Artisan", "Peckham").await;
        let id = first_cafe_id(&server).await;

        let response = server.get(&format!("/cafe/{id}")).await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let context = view_context(&response);
        assert_eq!(
            context.pointer("/cafe/name").and_then(Value::as_str),
            Some("Artisan")
        );

        let posted = server.post(&format!("/cafe/{id}")).await;
        assert_eq!(posted.status_code(), StatusCode::OK);

        let missing = server.get("/cafe/9999").await;
        assert_eq!(missing.status_code(), StatusCode::OK);
        assert_eq!(view_context(&missing).get("cafe"), Some(&Value::Null));
        Ok(())
    }

    #[tokio::test]
    async fn search_matches_location_exactly() -> Result<()> {
        let server = test_server(&[])?;
        add_cafe(&server, "Artisan", "Peckham").await;
        add_cafe(&server, "Old Spike", "Peckham").await;
        add_cafe(&server, "Mare Street", "Hackney").await;

        let response = server.get("/search").add_query_param("loc", "Peckham").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let mut names = listed_names(&view_context(&response));
        names.sort();
        assert_eq!(names, ["Artisan", "Old Spike"]);

        let none = server.get("/search").add_query_param("loc", "peckham").await;
        assert_eq!(none.status_code(), StatusCode::OK);
        let body: Value = none.json();
        assert_eq!(
            body.pointer("/error/Not Found").and_then(Value::as_str),
            Some("Sorry no cafe at that location.")
        );

        let missing_param = server.get("/search").await;
        assert_eq!(missing_param.status_code(), StatusCode::OK);
        let body: Value = missing_param.json();
        assert!(body.pointer("/error/Not Found").is_some());
        Ok(())
    }

    #[tokio::test]
    async fn update_price_sets_exact_value() -> Result<()> {
        let server = test_server(&[])?;
        add_cafe(&server, "Artisan", "Peckham").await;
        let id = first_cafe_id(&server).await;

        let response = server
            .patch(&format!("/update-price/{id}"))
            .add_query_param("new_price", "£3.10")
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(
            body.get("success").and_then(Value::as_str),
            Some("Successfully updated the price.")
        );

        let after: Value = server.get("/random").await.json();
        assert_eq!(
            after.pointer("/cafe/coffee_price").and_then(Value::as_str),
            Some("£3.10")
        );
        Ok(())
    }

    #[tokio::test]
    async fn update_price_on_unknown_id_is_bad_request() -> Result<()> {
        let server = test_server(&[])?;
        let response = server
            .patch("/update-price/42")
            .add_query_param("new_price", "£3.10")
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert!(body.pointer("/error/Not Found").is_some());
        Ok(())
    }

    #[tokio::test]
    async fn report_closed_removes_cafe() -> Result<()> {
        let server = test_server(&[])?;
        add_cafe(&server, "Artisan", "Peckham").await;
        add_cafe(&server, "Mare Street", "Hackney").await;
        let listing = view_context(&server.get("/all").await);
        let id = listing
            .pointer("/cafes/0/id")
            .and_then(Value::as_i64)
            .unwrap_or(-1);

        let response = server.get(&format!("/report-closed/{id}")).await;
        assert_eq!(response.status_code(), StatusCode::FOUND);
        assert_eq!(response.header("location"), "/all");

        let listing = view_context(&server.get("/all").await);
        assert_eq!(listed_names(&listing), ["Mare Street"]);
        let detail = view_context(&server.get(&format!("/cafe/{id}")).await);
        assert_eq!(detail.get("cafe"), Some(&Value::Null));

        let again = server.get(&format!("/report-closed/{id}")).await;
        assert_eq!(again.status_code(), StatusCode::NOT_FOUND);
        Ok(())
    }

    #[tokio::test]
    async fn signup_logs_new_user_in() -> Result<()> {
        let server = test_server(&[])?;
        let response = signup(&server, "Ada", "ada@example.com", "pw").await;
        assert_eq!(response.status_code(), StatusCode::FOUND);
        assert_eq!(response.header("location"), "/all");
        let cookie = response.cookie(SESSION_COOKIE);

        let listing = server.get("/all").add_cookie(cookie).await;
        let context = view_context(&listing);
        assert_eq!(context.get("logged_in"), Some(&Value::Bool(true)));
        assert_eq!(
            context.pointer("/current_user/name").and_then(Value::as_str),
            Some("Ada")
        );
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_signup_fails_differently_from_invalid_signup() -> Result<()> {
        let server = test_server(&[])?;
        signup(&server, "Ada", "ada@example.com", "pw").await;

        let duplicate = signup(&server, "Another Ada", "ada@example.com", "pw2").await;
        assert_eq!(duplicate.status_code(), StatusCode::CONFLICT);
        assert!(duplicate.maybe_cookie(SESSION_COOKIE).is_none());

        let invalid = signup(&server, "Bob", "", "pw").await;
        assert_eq!(invalid.status_code(), StatusCode::OK);
        assert_eq!(
            view_context(&invalid)
                .pointer("/errors/email/0")
                .and_then(Value::as_str),
            Some("This field is required.")
        );
        Ok(())
    }

    #[tokio::test]
    async fn login_with_correct_password_redirects_with_session() -> Result<()> {
        let server = test_server(&[])?;
        signup(&server, "Ada", "ada@example.com", "pw").await;

        let response = server
            .post("/login")
            .form(&[("email", "ada@example.com"), ("password", "pw")])
            .await;
        assert_eq!(response.status_code(), StatusCode::FOUND);
        assert_eq!(response.header("location"), "/all");

        let cookie = response.cookie(SESSION_COOKIE);
        let context = view_context(&server.get("/all").add_cookie(cookie).await);
        assert_eq!(context.get("logged_in"), Some(&Value::Bool(true)));
        Ok(())
    }

    #[tokio::test]
    async fn login_with_wrong_password_rerenders_without_session() -> Result<()> {
        let server = test_server(&[])?;
        signup(&server, "Ada", "ada@example.com", "pw").await;

        let response = server
            .post("/login")
            .form(&[("email", "ada@example.com"), ("password", "nope")])
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert!(response.text().contains("data-template=\"login.html\""));
        assert!(response.maybe_cookie(SESSION_COOKIE).is_none());
        let context = view_context(&response);
        assert_eq!(context.get("logged_in"), Some(&Value::Bool(false)));
        assert_eq!(context.get("errors"), Some(&Value::Object(Default::default())));
        assert!(context.pointer("/form/password").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn login_with_unknown_email_rerenders_without_session() -> Result<()> {
        let server = test_server(&[])?;
        let response = server
            .post("/login")
            .form(&[("email", "ghost@example.com"), ("password", "pw")])
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert!(response.maybe_cookie(SESSION_COOKIE).is_none());
        Ok(())
    }

    #[tokio::test]
    async fn logout_ends_session() -> Result<()> {
        let server = test_server(&[])?;
        let cookie = signup(&server, "Ada", "ada@example.com", "pw")
            .await
            .cookie(SESSION_COOKIE);

        let response = server.get("/logout").add_cookie(cookie.clone()).await;
        assert_eq!(response.status_code(), StatusCode::FOUND);
        assert_eq!(response.header("location"), "/all");

        let context = view_context(&server.get("/all").add_cookie(cookie).await);
        assert_eq!(context.get("logged_in"), Some(&Value::Bool(false)));
        Ok(())
    }

    #[tokio::test]
    async fn second_login_revokes_earlier_session() -> Result<()> {
        let server = test_server(&[])?;
        let first = signup(&server, "Ada", "ada@example.com", "pw")
            .await
            .cookie(SESSION_COOKIE);

        let second = server
            .post("/login")
            .add_cookie(first.clone())
            .form(&[("email", "ada@example.com"), ("password", "pw")])
            .await
            .cookie(SESSION_COOKIE);
        assert_ne!(first.value(), second.value());

        let stale = view_context(&server.get("/all").add_cookie(first.clone()).await);
        assert_eq!(stale.get("logged_in"), Some(&Value::Bool(false)));
        let live = view_context(&server.get("/all").add_cookie(second.clone()).await);
        assert_eq!(live.get("logged_in"), Some(&Value::Bool(true)));

        server.get("/logout").add_cookie(second).await;
        let after = view_context(&server.get("/all").add_cookie(first).await);
        assert_eq!(after.get("logged_in"), Some(&Value::Bool(false)));
        Ok(())
    }

    #[tokio::test]
    async fn non_integer_cafe_id_is_json_not_found() -> Result<()> {
        let server = test_server(&[])?;
        add_cafe(&server, "Artisan", "Peckham").await;

        for response in [
            server.get("/cafe/abc").await,
            server.get("/report-closed/abc").await,
            server
                .patch("/update-price/abc")
                .add_query_param("new_price", "£3")
                .await,
        ] {
            assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
            let body: Value = response.json();
            assert!(body.pointer("/error/Not Found").is_some());
        }

        let listing = view_context(&server.get("/all").await);
        assert_eq!(listed_names(&listing), ["Artisan"]);
        Ok(())
    }

    #[tokio::test]
    async fn forged_session_cookie_is_anonymous() -> Result<()> {
        let server = test_server(&[])?;
        signup(&server, "Ada", "ada@example.com", "pw").await;

        let forged = Cookie::new(SESSION_COOKIE, "00000000-0000-0000-0000-000000000000");
        let context = view_context(&server.get("/all").add_cookie(forged).await);
        assert_eq!(context.get("logged_in"), Some(&Value::Bool(false)));
        Ok(())
    }

    #[tokio::test]
    async fn cafe_added_while_logged_in_records_author() -> Result<()> {
        let server = test_server(&[])?;
        let cookie = signup(&server, "Ada", "ada@example.com", "pw")
            .await
            .cookie(SESSION_COOKIE);

        let response = server
            .post("/add")
            .add_cookie(cookie)
            .form(&cafe_fields("Artisan", "Peckham"))
            .await;
        assert_eq!(response.status_code(), StatusCode::FOUND);

        let body: Value = server.get("/random").await.json();
        assert_eq!(body.pointer("/cafe/author_id").and_then(Value::as_i64), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn admin_guard_only_applies_to_configured_routes() -> Result<()> {
        let server = test_server(&[GuardedRoute::ReportClosed])?;
        let admin = signup(&server, "Ada", "ada@example.com", "pw")
            .await
            .cookie(SESSION_COOKIE);
        let other = signup(&server, "Bob", "bob@example.com", "pw")
            .await
            .cookie(SESSION_COOKIE);

        let added = add_cafe(&server, "Artisan", "Peckham").await;
        assert_eq!(added.status_code(), StatusCode::FOUND);
        let id = first_cafe_id(&server).await;
        let path = format!("/report-closed/{id}");

        let anonymous = server.get(&path).await;
        assert_eq!(anonymous.status_code(), StatusCode::FORBIDDEN);

        let refused = server.get(&path).add_cookie(other).await;
        assert_eq!(refused.status_code(), StatusCode::FORBIDDEN);

        let allowed = server.get(&path).add_cookie(admin).await;
        assert_eq!(allowed.status_code(), StatusCode::FOUND);
        Ok(())
    }
}
