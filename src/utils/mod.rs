pub mod google;
pub mod hash;
pub mod html;
pub mod jwt;
pub mod password;
pub mod slug;
pub mod username;
pub mod validation;
