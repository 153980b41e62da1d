mod user;
mod forms;
mod task;
mod epitope;
mod request;

pub use user::{authorities_for, Authority, Role, User, UserId, UserProfile};
pub use forms::{LoginForm, RegisterForm, TaskQuery};
pub use task::{ActionType, EpitopeTaskData, TaskId, TaskStatus};
pub use epitope::{Epitope, EpitopeId};
pub use request::{FastaPayload, TaskCreationRequest};
