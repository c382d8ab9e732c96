use actix_web::{get, rt, web, Error, HttpRequest, HttpResponse};
use actix_ws::{Message, MessageStream, Session};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    configuration::ApplicationSettings,
    domain::{Run, RunEvent},
    routes::run_route::run_not_found,
    services::{RunManager, Subscriber},
};

/// Live progress of one run over a WebSocket.
///
/// The client first gets the current state of the run, then every company
/// result as it lands, and the socket closes after the terminal event.
#[get("/stream/{run_id}")]
async fn stream_run(
    req: HttpRequest,
    body: web::Payload,
    path: web::Path<String>,
    manager: web::Data<RunManager>,
    settings: web::Data<ApplicationSettings>,
) -> Result<HttpResponse, Error> {
    let Ok(run_id) = Uuid::parse_str(&path.into_inner()) else {
        return Ok(run_not_found());
    };
    if manager.get_run(run_id).is_err() {
        return Ok(run_not_found());
    }

    let (response, session, messages) = actix_ws::handle(&req, body)?;

    // Subscribe before reading the snapshot so no event falls in between.
    let (subscriber, events) = Subscriber::channel(settings.subscriber_buffer);
    let subscriber_id = subscriber.id;
    manager.broadcaster().subscribe(run_id, subscriber);

    let manager = manager.into_inner();
    rt::spawn(async move {
        if let Ok(run) = manager.get_run(run_id) {
            forward_events(run, session, messages, events).await;
        }
        manager.broadcaster().unsubscribe(run_id, subscriber_id);
    });

    Ok(response)
}

/// The first event a new subscriber receives.
fn opening_event(run: &Run) -> RunEvent {
    RunEvent::terminal(run).unwrap_or_else(|| RunEvent::progress(run))
}

async fn forward_events(
    run: Run,
    mut session: Session,
    mut messages: MessageStream,
    mut events: mpsc::Receiver<RunEvent>,
) {
    let opening = opening_event(&run);
    let mut done = opening.is_terminal();
    if send(&mut session, &opening).await.is_err() {
        return;
    }

    while !done {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    done = event.is_terminal();
                    if send(&mut session, &event).await.is_err() {
                        return;
                    }
                }
                None => {
                    log::warn!("Subscription to run {} was dropped", run.run_id);
                    break;
                }
            },
            message = messages.recv() => match message {
                Some(Ok(Message::Ping(bytes))) => {
                    if session.pong(&bytes).await.is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Close(reason))) => {
                    log::info!("Client closed stream of run {}: {:?}", run.run_id, reason);
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    log::warn!("Stream of run {} failed: {}", run.run_id, e);
                    return;
                }
                None => return,
            },
        }
    }

    let _ = session.close(None).await;
}

async fn send(session: &mut Session, event: &RunEvent) -> Result<(), actix_ws::Closed> {
    match serde_json::to_string(event) {
        Ok(text) => session.text(text).await,
        Err(e) => {
            log::error!("Failed to encode run event: {}", e);
            Ok(())
        }
    }
}
