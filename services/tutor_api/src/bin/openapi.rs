//! services/tutor_api/src/bin/openapi.rs
//!
//! Writes the OpenAPI document for the tutor REST API to `openapi.json`
//! (or to the path given as the first argument).

use tutor_lib::web::ApiDoc;
use utoipa::OpenApi;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "openapi.json".to_string());
    std::fs::write(&path, ApiDoc::openapi().to_pretty_json()?)?;
    println!("OpenAPI specification written to {}", path);
    Ok(())
}
