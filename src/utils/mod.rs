pub mod time;

use nanoid::nanoid;

/// Collision-resistant id for runs.
pub fn longid() -> String {
    nanoid!(21)
}

/// Short id for generated connection labels.
pub fn shortid() -> String {
    nanoid!(8)
}
