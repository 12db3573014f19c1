pub mod free_list;
