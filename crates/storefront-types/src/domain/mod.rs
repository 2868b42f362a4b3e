pub mod brand;
pub mod caller;
pub mod order;
pub mod product;
pub mod review;
pub mod sales;
pub mod views;
