mod feed;
mod post;
mod seen;
mod source;

pub use feed::{Feed, NewItem};
pub use post::{Post, Stats};
pub use seen::SeenList;
pub use source::{Source, SourceKind, Suggestion};
