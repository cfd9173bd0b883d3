//! ELF image loading — the `fs` collaborator's only consumer.

pub mod elf;
