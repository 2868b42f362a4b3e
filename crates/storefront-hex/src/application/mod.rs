pub mod catalog_service;
pub mod locks;
pub mod order_service;
pub mod review_service;
pub mod seed;
