use std::{env, fs, path::PathBuf};

use ts_rs::TS;

fn declarations() -> Vec<String> {
    vec![
        db::models::client_config::ClientConfig::decl(),
        db::models::client_config::CreateClientConfig::decl(),
        db::models::client_config::UpdateClientConfig::decl(),
        db::models::template_assignment::TemplateAssignment::decl(),
        db::models::template_assignment::CreateTemplateAssignment::decl(),
        db::models::fallback_variable::FallbackVariable::decl(),
        db::models::fallback_variable::CreateFallbackVariable::decl(),
        db::models::generated_asset::AssetSource::decl(),
        db::models::generated_asset::AssetType::decl(),
        db::models::generated_asset::AssetStatus::decl(),
        db::models::generated_asset::GeneratedAsset::decl(),
        db::models::generated_asset::CreateGeneratedAsset::decl(),
        db::models::generated_asset::AssetFilter::decl(),
        services::services::template_variables::VariableType::decl(),
        services::services::template_variables::TemplateVariable::decl(),
        services::services::template_variables::VariableViolation::decl(),
        services::services::template_manager::VariableSourceKind::decl(),
        services::services::template_manager::ResolvedTemplate::decl(),
        services::services::template_manager::TemplateCacheStats::decl(),
        services::services::heygen::HeyGenTemplate::decl(),
        services::services::heygen::VideoState::decl(),
        services::services::heygen::VideoStatus::decl(),
        services::services::openai::GeneratedText::decl(),
        services::services::openai::GeneratedImage::decl(),
        services::services::runway::ImageToVideoRequest::decl(),
        services::services::runway::RunwayTaskState::decl(),
        services::services::runway::RunwayTask::decl(),
        services::services::cloudinary::ResourceType::decl(),
        services::services::cloudinary::UploadedMedia::decl(),
        services::services::supabase::UserRole::decl(),
        services::services::supabase::AuthUser::decl(),
        utils::response::FieldError::decl(),
        utils::response::ApiResponse::<()>::decl(),
        server::routes::health::HealthStatus::decl(),
        server::routes::templates::InvalidateCacheRequest::decl(),
        server::routes::templates::UpdateAssignmentRequest::decl(),
        server::routes::templates::ReplaceFallbackVariables::decl(),
        server::routes::templates::DeletedCount::decl(),
        server::routes::generate::GenerateVideoRequest::decl(),
        server::routes::generate::VideoJob::decl(),
        server::routes::generate::VideoJobStatus::decl(),
        server::routes::generate::GenerateTextRequest::decl(),
        server::routes::generate::GenerateImageRequest::decl(),
        server::routes::generate::ImageResult::decl(),
        server::routes::generate::GenerateRunwayRequest::decl(),
        server::routes::generate::RunwayJob::decl(),
        server::routes::generate::RunwayJobStatus::decl(),
        server::routes::cloudinary::UploadResult::decl(),
        server::routes::cloudinary::DestroyResult::decl(),
    ]
}

fn main() -> std::io::Result<()> {
    let shared = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../shared");
    fs::create_dir_all(&shared)?;

    let mut output = String::from(
        "// This file was generated by `cargo run --bin generate_types`. Do not edit it by hand.\n\n",
    );
    for decl in declarations() {
        output.push_str("export ");
        output.push_str(&decl);
        output.push_str("\n\n");
    }

    let target = shared.join("types.ts");
    let check = env::args().any(|arg| arg == "--check");
    if check {
        let current = fs::read_to_string(&target).unwrap_or_default();
        if current != output {
            eprintln!("{} is out of date; run generate_types", target.display());
            std::process::exit(1);
        }
        println!("{} is up to date", target.display());
        return Ok(());
    }

    fs::write(&target, output)?;
    println!("Wrote {}", target.display());
    Ok(())
}
