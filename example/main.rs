use std::{io, sync::Arc};

use corohttp::{
    BindSpec, Binder, CoroConfig, Dispatch, HandlerError, HandlerRequest, HandlerResponse,
    SocketServer, handler_fn,
    server::{HttpSocketHandler, StandardSocketHandler, ThreadingSocketHandler},
};

/// `example [ADDRESS] [--blocking]`, listens on port 3000 by default.
fn main() -> io::Result<()> {
    env_logger::init();

    let mut spec = BindSpec::port(3000);
    let mut blocking = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--blocking" => blocking = true,
            arg => spec = arg.parse().map_err(io::Error::other)?,
        }
    }

    let dispatch = if blocking {
        let http = HttpSocketHandler::new(Arc::new(handler_fn(handle)), Arc::default());
        Dispatch::blocking(ThreadingSocketHandler::new(StandardSocketHandler::new(http)))
    } else {
        Dispatch::readiness(handler_fn(handle), CoroConfig::default())
    };

    let mut server = SocketServer::bind(&Binder::new(spec), dispatch)?;
    println!("listening on {}", server.local_addr()?);
    server.run();
    Ok(())
}

fn handle(req: HandlerRequest) -> Result<HandlerResponse, HandlerError> {
    println!("> {} {} {}", req.method, req.path, req.version);

    match req.method.as_str() {
        "GET" | "HEAD" => Ok(HandlerResponse::new(200).with_data("Hell")),
        "POST" => {
            let body = req.body.unwrap_or_default();
            Ok(HandlerResponse::new(200)
                .with_header("Content-Type", "application/octet-stream")
                .with_data(body))
        }
        _ => Err(HandlerError::UnsupportedMethod),
    }
}
