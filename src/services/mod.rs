pub mod voucher_lifecycle;
