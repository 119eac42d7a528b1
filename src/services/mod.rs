pub mod challenges;
pub mod friends;
pub mod invitations;
pub mod progress;
