use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    Extension,
};
use futures::{SinkExt, StreamExt};
use serde_json::{json, to_string, Value};
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedSender},
    Mutex,
};

use crate::app::AppState;
use crate::models::booking_model::{BookedSeatsQuery, Booking};

/// Live seat-map updates pushed to every connected client.
#[derive(Default)]
pub struct SeatFeed {
    clients: Mutex<Vec<UnboundedSender<Message>>>,
}

impl SeatFeed {
    pub fn new() -> Self {
        Self::default()
    }

    async fn register(&self, client: UnboundedSender<Message>) {
        self.clients.lock().await.push(client);
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Sends to every client, dropping those whose socket has gone away.
    pub async fn broadcast(&self, action_type: &str, status: &str, data: Value) {
        let message_text = envelope(action_type, status, data);
        let mut clients = self.clients.lock().await;
        clients.retain(|client| client.send(Message::Text(message_text.clone())).is_ok());
    }

    pub async fn seats_held(&self, booking: &Booking) {
        self.broadcast("seats_held", "success", seat_change(booking)).await;
    }

    pub async fn seats_released(&self, booking: &Booking) {
        self.broadcast("seats_released", "success", seat_change(booking)).await;
    }
}

fn envelope(action_type: &str, status: &str, data: Value) -> String {
    let message = json!({
        "action_type": action_type,
        "status": status,
        "data": data
    });
    to_string(&message).unwrap_or_else(|_| "{}".to_string())
}

fn seat_change(booking: &Booking) -> Value {
    json!({
        "bookingId": booking.id.to_hex(),
        "movieId": booking.movie.to_hex(),
        "theater": booking.theater.name,
        "timeSlot": booking.time_slot.time,
        "date": booking.date.try_to_rfc3339_string().unwrap_or_default(),
        "seatNumbers": booking.seat_numbers,
    })
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = unbounded_channel::<Message>();

    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(err) = sender.send(message).await {
                tracing::debug!(error = %err, "websocket client went away");
                break;
            }
        }
    });

    state.feed.register(tx.clone()).await;

    while let Some(Ok(message)) = receiver.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let reply = handle_request(&state, &text).await;
        if tx.send(Message::Text(reply)).is_err() {
            break;
        }
    }
}

/// Answers a single client request; replies go to the requester only.
async fn handle_request(state: &AppState, text: &str) -> String {
    let request: Value = serde_json::from_str(text).unwrap_or_else(|_| {
        tracing::debug!("failed to parse websocket request");
        Value::Null
    });

    match request["action"].as_str() {
        Some("get_booked_seats") => {
            match serde_json::from_value::<BookedSeatsQuery>(request["data"].clone()) {
                Ok(query) => match state.resolver.booked_seats(query).await {
                    Ok(response) => envelope("get_booked_seats", "success", json!(response)),
                    Err(err) => envelope(
                        "get_booked_seats",
                        "error",
                        json!({ "error": err.to_string() }),
                    ),
                },
                Err(_) => envelope(
                    "get_booked_seats",
                    "error",
                    json!({ "error": "Failed to parse seat query" }),
                ),
            }
        }
        Some(action_type) => envelope(
            action_type,
            "error",
            json!({ "error": "Unsupported action" }),
        ),
        None => envelope("error", "error", json!({ "error": "Action type is missing" })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booking_model::PaymentStatus;
    use crate::services::fixtures::world;

    #[tokio::test]
    async fn broadcast_prunes_closed_clients() {
        let feed = SeatFeed::new();
        let (open_tx, mut open_rx) = unbounded_channel();
        let (closed_tx, closed_rx) = unbounded_channel();
        drop(closed_rx);
        feed.register(open_tx).await;
        feed.register(closed_tx).await;

        feed.broadcast("seats_held", "success", json!({ "seatNumbers": [1] })).await;

        assert_eq!(feed.client_count().await, 1);
        let Some(Message::Text(text)) = open_rx.recv().await else {
            panic!("expected a text frame");
        };
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["action_type"], "seats_held");
        assert_eq!(value["data"]["seatNumbers"][0], 1);
    }

    #[tokio::test]
    async fn seat_requests_are_answered() {
        let world = world().await;
        let state = AppState::new(
            world.store.clone(),
            Arc::new(crate::payment::MockPaymentProvider::new()),
            world.settings.clone(),
        );
        let date = world.in_days(1);
        world.seed_booking(date, &[4, 2], PaymentStatus::Pending).await;

        let request = json!({
            "action": "get_booked_seats",
            "data": {
                "movieId": world.movie.id.to_hex(),
                "theater": "Cinema A",
                "timeSlot": "18:00",
                "date": date,
            }
        });
        let reply: Value = serde_json::from_str(&handle_request(&state, &request.to_string()).await).unwrap();
        assert_eq!(reply["status"], "success");
        assert_eq!(reply["data"]["bookedSeatNumbers"], json!([2, 4]));

        let reply: Value =
            serde_json::from_str(&handle_request(&state, r#"{"action":"dance"}"#).await).unwrap();
        assert_eq!(reply["status"], "error");

        let reply: Value = serde_json::from_str(&handle_request(&state, "not json").await).unwrap();
        assert_eq!(reply["action_type"], "error");
    }
}
