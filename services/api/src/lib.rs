mod cli;
mod infra;
mod routes;
mod server;
mod stats;

use admissions::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
