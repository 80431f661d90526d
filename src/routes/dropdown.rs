use actix_web::{get, web, HttpResponse};

use crate::{database::Database, error::AppResult, models::dropdown::DropdownOption};

#[get("/dropdowns/{category}")]
pub async fn get_dropdown_options(
    db: web::Data<Database>,
    category: web::Path<String>,
) -> AppResult<HttpResponse> {
    let category = category.into_inner();
    let options = db
        .run(move |conn| DropdownOption::find_by_category(conn, &category))
        .await?;
    Ok(HttpResponse::Ok().json(options))
}
