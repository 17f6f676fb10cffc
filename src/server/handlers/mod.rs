pub mod config;
pub mod corpus;
pub mod documents;
pub mod health;
pub mod response;
pub mod rules;
