pub mod disease_table;
