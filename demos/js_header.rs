//! This example shows a bare bones example of adding CSRF protection to a JSON
//! endpoint by sending the token in a custom header. Remember that these
//! examples are isolated, may not consider all security aspects, such as the
//! strengths and weaknesses of the double-submit technique used.

use actix_signed_csrf::extractor::CsrfToken;
use actix_signed_csrf::{CsrfMiddleware, SigningKey};
use actix_web::web::Json;
use actix_web::HttpResponse;
use actix_web::{get, post, App, HttpServer, Responder};
use rand::prelude::StdRng;
use serde::{Deserialize, Serialize};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Tokens signed with this key stay valid across restarts. Without a
    // `CSRF_KEY`, a new key is generated for this run only.
    let key = match std::env::var("CSRF_KEY") {
        Ok(encoded) => SigningKey::from_base64(&encoded)?,
        Err(_) => SigningKey::generate()?,
    };

    // Build the middleware once, so every worker shares the same key.
    let csrf = CsrfMiddleware::<StdRng>::with_key(key, "http://127.0.0.1:8080".parse()?)
        // We serve plain HTTP locally, so the `Secure` cookie attribute and
        // the `__Host-` prefix that depends on it have to go.
        .secure(false)
        .cookie_name("Csrf-Token");

    HttpServer::new(move || App::new().wrap(csrf.clone()).service(counter_ui).service(count))
        .bind(("127.0.0.1", 8080))?
        .run()
        .await?;
    Ok(())
}

/// Returns a page with the CSRF token embedded in it. The cookie stays
/// `HttpOnly`; scripts read the token from the page instead.
#[get("/")]
async fn counter_ui(token: CsrfToken) -> impl Responder {
    let body = format!(
        r#"
        <!DOCTYPE html>
        <html>
        <head>
        <meta charset="UTF-8">
        <meta name="csrf-token" content="{}">
        <title>Example</title>
        </head>
        <body>
        <script>
        function submit() {{
            const csrfValue = document
                .querySelector('meta[name="csrf-token"]')
                .getAttribute("content");
            let request = new Request("/count", {{
                method: "POST",
                headers: {{
                    "Content-Type": "application/json",
                    "Csrf-Token": csrfValue,
                }},
                body: JSON.stringify({{ count: 0 }}),
            }});
            fetch(request)
                .then(resp => resp.json())
                .then(resp => console.log(resp.count));
        }}
        </script>
        <button onclick="submit()">Click me!</button>
        </body>
        </html>
        "#,
        token.get()
    );

    HttpResponse::Ok().content_type("text/html").body(body)
}

#[derive(Deserialize)]
struct Request {
    count: usize,
}

#[derive(Serialize)]
struct Response {
    count: usize,
}

/// By the time this runs, the middleware has checked the header token against
/// the cookie and the request origin. Browsers send `Origin` on `fetch` POST
/// requests, so no extra work is needed here.
#[post("/count")]
async fn count(json: Json<Request>) -> impl Responder {
    // NOTE: Remember that CSRF protections are only effective if there isn't
    // an XSS vector.
    HttpResponse::Ok().json(Response {
        count: json.count + 1,
    })
}
