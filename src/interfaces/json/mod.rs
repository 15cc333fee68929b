pub mod order_reader;
