pub mod cloudinary;
pub mod config;
pub mod heygen;
pub mod openai;
pub mod runway;
pub mod supabase;
pub mod template_manager;
pub mod template_variables;
