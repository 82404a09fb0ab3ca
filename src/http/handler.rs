use crate::http::AppState;
use crate::models::{
    Author, AuthorList, AuthorName, AuthorNameBlankError, AuthorPatch, BirthDate,
    BirthDateInFutureError, Book, BookPatch, CreateAuthorError, CreateAuthorRequest,
    CreateBookError, CreateBookRequest, EmptyAuthorListError, EmptyAuthorPatchError,
    InvalidStatusError, ListAuthorBooksError, ListAuthorBooksRequest, PublicationStatus,
    UpdateAuthorError, UpdateAuthorRequest, UpdateBookError, UpdateBookRequest,
};
use crate::repositories::{AuthorRepository, BookRepository};
use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug)]
pub struct ApiSuccess<T: Serialize>(StatusCode, Json<T>);

impl<T: Serialize> ApiSuccess<T> {
    pub const fn new(status: StatusCode, data: T) -> Self {
        Self(status, Json(data))
    }
}

impl<T: Serialize> IntoResponse for ApiSuccess<T> {
    fn into_response(self) -> axum::response::Response {
        (self.0, self.1).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    status: u16,
    error: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    InternalServerError(String),
}

impl ApiError {
    const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let (Self::BadRequest(error)
        | Self::NotFound(error)
        | Self::Conflict(error)
        | Self::InternalServerError(error)) = self;

        let body = ApiErrorBody {
            status: status.as_u16(),
            error,
        };
        (status, Json(body)).into_response()
    }
}

fn internal_error(cause: &anyhow::Error) -> ApiError {
    tracing::error!("{cause:#}");
    ApiError::InternalServerError("internal server error".to_string())
}

impl From<CreateAuthorError> for ApiError {
    fn from(err: CreateAuthorError) -> Self {
        match err {
            CreateAuthorError::Duplicate { name } => {
                Self::Conflict(format!(r#"author "{name}" already exists"#))
            }
            CreateAuthorError::Other(cause) => internal_error(&cause),
        }
    }
}

impl From<UpdateAuthorError> for ApiError {
    fn from(err: UpdateAuthorError) -> Self {
        match err {
            UpdateAuthorError::NotFound { .. } => Self::NotFound("author not found".to_string()),
            UpdateAuthorError::Duplicate { name } => {
                Self::Conflict(format!(r#"author "{name}" already exists"#))
            }
            UpdateAuthorError::LostUpdate { .. } => {
                Self::Conflict("failed to update author".to_string())
            }
            UpdateAuthorError::Other(cause) => internal_error(&cause),
        }
    }
}

impl From<ListAuthorBooksError> for ApiError {
    fn from(err: ListAuthorBooksError) -> Self {
        match err {
            ListAuthorBooksError::NotFound { .. } => {
                Self::NotFound("author not found".to_string())
            }
            ListAuthorBooksError::Other(cause) => internal_error(&cause),
        }
    }
}

impl From<CreateBookError> for ApiError {
    fn from(err: CreateBookError) -> Self {
        match err {
            CreateBookError::UnknownAuthors => {
                Self::BadRequest("one or more authors not found".to_string())
            }
            CreateBookError::Conflict(_) => {
                Self::Conflict("conflict performing catalog operation".to_string())
            }
            CreateBookError::Other(cause) => internal_error(&cause),
        }
    }
}

impl From<UpdateBookError> for ApiError {
    fn from(err: UpdateBookError) -> Self {
        match err {
            UpdateBookError::NotFound { .. } => Self::NotFound("book not found".to_string()),
            UpdateBookError::UnknownAuthors => {
                Self::BadRequest("one or more authors not found".to_string())
            }
            UpdateBookError::LostUpdate { .. } => {
                Self::Conflict("failed to update book".to_string())
            }
            UpdateBookError::Conflict(_) => {
                Self::Conflict("conflict performing catalog operation".to_string())
            }
            UpdateBookError::Other(cause) => internal_error(&cause),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAuthorHttpRequest {
    name: String,
    birth_date: NaiveDate,
}

#[derive(Error, Debug)]
pub enum ParseCreateAuthorHttpRequestError {
    #[error(transparent)]
    Name(#[from] AuthorNameBlankError),
    #[error(transparent)]
    BirthDate(#[from] BirthDateInFutureError),
}

impl From<ParseCreateAuthorHttpRequestError> for ApiError {
    fn from(err: ParseCreateAuthorHttpRequestError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl TryFrom<CreateAuthorHttpRequest> for CreateAuthorRequest {
    type Error = ParseCreateAuthorHttpRequestError;

    fn try_from(value: CreateAuthorHttpRequest) -> Result<Self, Self::Error> {
        let name = AuthorName::new(&value.name)?;
        let birth_date = BirthDate::new(value.birth_date)?;
        Ok(Self::new(name, birth_date))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAuthorHttpRequest {
    new_name: Option<String>,
    new_birth_date: Option<NaiveDate>,
}

#[derive(Error, Debug)]
pub enum ParseUpdateAuthorHttpRequestError {
    #[error(transparent)]
    Name(#[from] AuthorNameBlankError),
    #[error(transparent)]
    BirthDate(#[from] BirthDateInFutureError),
    #[error(transparent)]
    Empty(#[from] EmptyAuthorPatchError),
}

impl From<ParseUpdateAuthorHttpRequestError> for ApiError {
    fn from(err: ParseUpdateAuthorHttpRequestError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl TryFrom<UpdateAuthorHttpRequest> for AuthorPatch {
    type Error = ParseUpdateAuthorHttpRequestError;

    fn try_from(value: UpdateAuthorHttpRequest) -> Result<Self, Self::Error> {
        let name = value.new_name.as_deref().map(AuthorName::new).transpose()?;
        let birth_date = value.new_birth_date.map(BirthDate::new).transpose()?;
        Ok(Self::new(name, birth_date)?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookHttpRequest {
    title: String,
    #[serde(default)]
    author_ids: Vec<i64>,
    price: Option<Decimal>,
    status: Option<String>,
}

#[derive(Error, Debug)]
pub enum ParseCreateBookHttpRequestError {
    #[error(transparent)]
    Authors(#[from] EmptyAuthorListError),
    #[error(transparent)]
    Status(#[from] InvalidStatusError),
}

impl From<ParseCreateBookHttpRequestError> for ApiError {
    fn from(err: ParseCreateBookHttpRequestError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl TryFrom<CreateBookHttpRequest> for CreateBookRequest {
    type Error = ParseCreateBookHttpRequestError;

    fn try_from(value: CreateBookHttpRequest) -> Result<Self, Self::Error> {
        let authors = AuthorList::new(value.author_ids)?;
        let status = value
            .status
            .as_deref()
            .map(str::parse::<PublicationStatus>)
            .transpose()?;
        Ok(Self::new(value.title, authors, value.price, status))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookHttpRequest {
    title: Option<String>,
    author_ids: Option<Vec<i64>>,
    price: Option<Decimal>,
    status: Option<String>,
}

#[derive(Error, Debug)]
pub enum ParseUpdateBookHttpRequestError {
    #[error(transparent)]
    Authors(#[from] EmptyAuthorListError),
    #[error(transparent)]
    Status(#[from] InvalidStatusError),
}

impl From<ParseUpdateBookHttpRequestError> for ApiError {
    fn from(err: ParseUpdateBookHttpRequestError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl TryFrom<UpdateBookHttpRequest> for BookPatch {
    type Error = ParseUpdateBookHttpRequestError;

    fn try_from(value: UpdateBookHttpRequest) -> Result<Self, Self::Error> {
        let mut patch = Self::new();
        if let Some(title) = value.title {
            patch.set_title(title);
        }
        if let Some(ids) = value.author_ids {
            patch.set_authors(AuthorList::new(ids)?);
        }
        if let Some(price) = value.price {
            patch.set_price(price);
        }
        if let Some(status) = value.status {
            patch.set_status(status.parse()?);
        }
        Ok(patch)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorHttpResponse {
    id: i64,
    name: String,
    birth_date: NaiveDate,
}

impl From<Author> for AuthorHttpResponse {
    fn from(value: Author) -> Self {
        Self {
            id: value.id(),
            name: value.name().to_string(),
            birth_date: value.birth_date().date(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookHttpResponse {
    id: i64,
    title: String,
    author_ids: Vec<i64>,
    price: Decimal,
    status: String,
}

impl From<Book> for BookHttpResponse {
    fn from(value: Book) -> Self {
        Self {
            id: value.id(),
            title: value.title().to_string(),
            author_ids: value.authors().ids().to_vec(),
            price: value.price().unwrap_or(Decimal::ZERO),
            status: value.status().to_string(),
        }
    }
}

pub async fn create_author<AR, BR>(
    State(state): State<AppState<AR, BR>>,
    Json(body): Json<CreateAuthorHttpRequest>,
) -> Result<ApiSuccess<AuthorHttpResponse>, ApiError>
where
    AR: AuthorRepository + Clone,
    BR: BookRepository + Clone,
{
    let req = body.try_into()?;
    state
        .author_repo
        .create_author(&req)
        .await
        .map_err(ApiError::from)
        .map(|author| ApiSuccess::new(StatusCode::CREATED, author.into()))
}

pub async fn update_author<AR, BR>(
    State(state): State<AppState<AR, BR>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateAuthorHttpRequest>,
) -> Result<ApiSuccess<AuthorHttpResponse>, ApiError>
where
    AR: AuthorRepository + Clone,
    BR: BookRepository + Clone,
{
    let patch = body.try_into()?;
    let req = UpdateAuthorRequest::new(id, patch);
    state
        .author_repo
        .update_author(&req)
        .await
        .map_err(ApiError::from)
        .map(|author| ApiSuccess::new(StatusCode::OK, author.into()))
}

pub async fn list_author_books<AR, BR>(
    State(state): State<AppState<AR, BR>>,
    Path(id): Path<i64>,
) -> Result<ApiSuccess<Vec<BookHttpResponse>>, ApiError>
where
    AR: AuthorRepository + Clone,
    BR: BookRepository + Clone,
{
    let req = ListAuthorBooksRequest::new(id);
    state
        .author_repo
        .list_books_by_author(&req)
        .await
        .map_err(ApiError::from)
        .map(|books| {
            ApiSuccess::new(
                StatusCode::OK,
                books.into_iter().map(BookHttpResponse::from).collect(),
            )
        })
}

pub async fn create_book<AR, BR>(
    State(state): State<AppState<AR, BR>>,
    Json(body): Json<CreateBookHttpRequest>,
) -> Result<ApiSuccess<BookHttpResponse>, ApiError>
where
    AR: AuthorRepository + Clone,
    BR: BookRepository + Clone,
{
    let req = body.try_into()?;
    state
        .book_repo
        .create_book(&req)
        .await
        .map_err(ApiError::from)
        .map(|book| ApiSuccess::new(StatusCode::CREATED, book.into()))
}

pub async fn update_book<AR, BR>(
    State(state): State<AppState<AR, BR>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateBookHttpRequest>,
) -> Result<ApiSuccess<BookHttpResponse>, ApiError>
where
    AR: AuthorRepository + Clone,
    BR: BookRepository + Clone,
{
    let patch = body.try_into()?;
    let req = UpdateBookRequest::new(id, patch);
    state
        .book_repo
        .update_book(&req)
        .await
        .map_err(ApiError::from)
        .map(|book| ApiSuccess::new(StatusCode::OK, book.into()))
}
