use chrono::Utc;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

mod comment;
pub use comment::{Comment, CommentId, Content, NewComment, ResourceId, Status};

mod error;
pub use error::Error;

mod member;
pub use member::{MemberId, Profile};

mod page;
pub use page::{CommentPage, Cursor, Cursors, PagingMetadata, RootListing, ThreadPage};

mod service;
pub use service::{CommentService, MemberDirectory};

// Validation functions live throughout thready-api. They reject data that the
// remote service would refuse anyway, so that the client can surface the
// failure without a round-trip.

pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(String::from(s)));
    }
    Ok(())
}
