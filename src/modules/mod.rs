pub mod books;
pub mod my_books;
pub mod users;

use std::sync::Arc;

use bookshelf_kernel::ModuleRegistry;

use crate::state::AppState;

/// Register every bookshelf module with the registry
pub fn register_all(registry: &mut ModuleRegistry, state: &AppState) {
    registry.register(Arc::new(users::AuthModule::new(state.clone())));
    registry.register(Arc::new(users::ProfileModule::new(state.clone())));
    registry.register(Arc::new(books::BooksModule::new(state.clone())));
    registry.register(Arc::new(my_books::MyBooksModule::new(state.clone())));
}
