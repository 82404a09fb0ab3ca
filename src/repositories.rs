use crate::models::{
    Author, Book, CreateAuthorError, CreateAuthorRequest, CreateBookError, CreateBookRequest,
    ListAuthorBooksError, ListAuthorBooksRequest, UpdateAuthorError, UpdateAuthorRequest,
    UpdateBookError, UpdateBookRequest,
};
use async_trait::async_trait;

#[async_trait]
pub trait AuthorRepository: Send + Sync + 'static {
    async fn create_author(&self, req: &CreateAuthorRequest) -> Result<Author, CreateAuthorError>;

    async fn update_author(&self, req: &UpdateAuthorRequest) -> Result<Author, UpdateAuthorError>;

    /// Books the author appears on, ordered by book id, each carrying its
    /// complete ordered author list.
    async fn list_books_by_author(
        &self,
        req: &ListAuthorBooksRequest,
    ) -> Result<Vec<Book>, ListAuthorBooksError>;
}

#[async_trait]
pub trait BookRepository: Send + Sync + 'static {
    async fn create_book(&self, req: &CreateBookRequest) -> Result<Book, CreateBookError>;

    async fn update_book(&self, req: &UpdateBookRequest) -> Result<Book, UpdateBookError>;
}
