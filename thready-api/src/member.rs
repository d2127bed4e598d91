use crate::STUB_UUID;

use uuid::Uuid;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct MemberId(pub Uuid);

impl MemberId {
    pub fn stub() -> MemberId {
        MemberId(STUB_UUID)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: MemberId,
    pub name: String,
    pub avatar_url: Option<String>,
}

impl Profile {
    /// Placeholder used when the member directory could not resolve `id`
    pub fn unknown(id: MemberId) -> Profile {
        Profile {
            id,
            name: String::from("Unknown member"),
            avatar_url: None,
        }
    }
}
