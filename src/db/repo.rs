mod user;
mod user_db;
mod user_mem;

pub use user::{EMAIL_CONSTRAINT, USERNAME_CONSTRAINT, UserRepo};
pub use user_db::UserRepository;
pub use user_mem::MemoryUserRepo;
