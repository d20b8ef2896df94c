pub mod approval;
pub mod budget;
pub mod claim;
pub mod employee;
