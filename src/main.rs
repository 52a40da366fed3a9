use rawserve::config::Config;
use rawserve::http::request::Request;
use rawserve::http::response::ResponseBuilder;
use rawserve::router::Router;
use rawserve::server::Server;

fn hello(res: &mut ResponseBuilder, _req: &Request) {
    res.set_status_code(200);
    res.set_header("Content-Type", "text/plain; charset=utf-8");
    res.set_body("Hello World");
}

/// Echoes every submitted form field, one `name=value` per line.
fn form(res: &mut ResponseBuilder, req: &Request) {
    let mut body = String::new();
    for (name, values) in req.form.iter() {
        for value in values {
            body.push_str(&format!("{name}={value}\n"));
        }
    }
    for (name, values) in req.post_form.iter() {
        for value in values {
            body.push_str(&format!("{name}={}\n", String::from_utf8_lossy(value)));
        }
    }

    res.set_status_code(200);
    res.set_header("Content-Type", "text/plain; charset=utf-8");
    res.set_body(body);
}

fn not_found(res: &mut ResponseBuilder, req: &Request) {
    if req.has_errors() {
        res.set_status_code(400);
        res.set_body("400 Bad Request");
        return;
    }
    res.set_status_code(404);
    res.set_body("404 Not Found");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;

    let mut router = Router::new();
    router.register("/", hello);
    router.register("/form", form);
    router.set_default(not_found);

    let server = Server::new(cfg.server, router);

    tokio::select! {
        res = server.run() => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
