pub mod bridge_file;
pub mod compare;
pub mod corpus;
pub mod extraction;
pub mod flows;
pub mod oracle;
pub mod process;
