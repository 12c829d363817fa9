pub mod local_host;
pub mod vercel;
