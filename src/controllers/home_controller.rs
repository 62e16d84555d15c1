pub async fn index() -> &'static str {
    "Movie booking API is running"
}
