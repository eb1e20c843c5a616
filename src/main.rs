use anyhow::{Context, Result};
use dialoguer::{Input, Password};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use legalisir_console::auth::{
    AuthSession, FileCredentialStore, LoginRedirect, RefreshCoordinator, UserProfile,
};
use legalisir_console::config::{Command, Config};
use legalisir_console::http_client::AuthenticatedHttpClient;
use legalisir_console::permohonan::{DocumentKind, Permohonan, PermohonanApi, PermohonanStatus};
use legalisir_console::transport::ReqwestTransport;

/// Everything a subcommand needs
struct Console {
    session: AuthSession,
    permohonan: PermohonanApi,
    redirect: Arc<LoginRedirect>,
}

impl Console {
    fn build(config: &Config) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(
            &config.backend_url,
            Duration::from_secs(config.http_connect_timeout),
            Duration::from_secs(config.http_request_timeout),
        )?);

        let store = Arc::new(FileCredentialStore::open(&config.credentials_file)?);
        tracing::debug!("Credentials file: {}", store.path().display());

        let redirect = Arc::new(LoginRedirect::new());
        let coordinator = Arc::new(
            RefreshCoordinator::new(store, transport.clone(), redirect.clone())
                .with_refresh_path(&config.refresh_path)
                .with_login_path(&config.login_path),
        );
        let client = Arc::new(AuthenticatedHttpClient::new(transport.clone(), coordinator));

        Ok(Self {
            session: AuthSession::new(transport, client.clone()),
            permohonan: PermohonanApi::new(client),
            redirect,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config, command) = Config::load()?;
    config.validate()?;

    // Logs go to stderr so command output stays pipeable
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!("Backend: {}", config.backend_url);

    let console = Console::build(&config)?;

    if let Err(e) = run(&console, command).await {
        if let Some(path) = console.redirect.requested() {
            eprintln!(
                "Sesi telah berakhir ({}). Jalankan `legalisir-console login` untuk masuk kembali.",
                path
            );
        }
        return Err(e);
    }

    Ok(())
}

async fn run(console: &Console, command: Command) -> Result<()> {
    match command {
        Command::Login { email } => {
            let email = match email {
                Some(email) => email,
                None => Input::new()
                    .with_prompt("Email")
                    .interact_text()
                    .context("Failed to read email")?,
            };
            let password = Password::new()
                .with_prompt("Password")
                .interact()
                .context("Failed to read password")?;

            let user = console.session.login(&email, &password).await?;
            match user {
                Some(user) => println!("Login berhasil. Selamat datang, {}", user.name),
                None => println!("Login berhasil."),
            }
        }

        Command::Register => {
            let name: String = Input::new()
                .with_prompt("Nama")
                .interact_text()
                .context("Failed to read name")?;
            let email: String = Input::new()
                .with_prompt("Email")
                .interact_text()
                .context("Failed to read email")?;
            let password = Password::new()
                .with_prompt("Password")
                .with_confirmation("Ulangi password", "Password tidak sama")
                .interact()
                .context("Failed to read password")?;

            console
                .session
                .register(&name, &email, &password, &password)
                .await?;
            println!("Registrasi berhasil.");
        }

        Command::Logout => {
            console.session.logout().await?;
            println!("Anda telah keluar.");
        }

        Command::ForgotPassword { email } => {
            let email = match email {
                Some(email) => email,
                None => Input::new()
                    .with_prompt("Email")
                    .interact_text()
                    .context("Failed to read email")?,
            };
            let message = console.session.forgot_password(&email).await?;
            println!("{}", message);
        }

        Command::ResetPassword { token, email } => {
            let password = Password::new()
                .with_prompt("Password baru")
                .with_confirmation("Ulangi password", "Password tidak sama")
                .interact()
                .context("Failed to read password")?;
            let message = console
                .session
                .reset_password(&token, &email, &password, &password)
                .await?;
            println!("{}", message);
        }

        Command::ResendVerification => {
            let message = console.session.resend_email_verification().await?;
            println!("{}", message);
        }

        Command::Whoami { refresh } => {
            let user = if refresh {
                Some(console.session.fetch_user().await?)
            } else {
                console.session.current_user()
            };
            match user {
                Some(user) => print_user(&user),
                None => println!("Belum login."),
            }
        }

        Command::List { status, per_page } => {
            let page = console.permohonan.list(per_page).await?;
            let wanted = status.map(PermohonanStatus::from);
            let rows: Vec<&Permohonan> = page
                .items
                .iter()
                .filter(|item| wanted.map_or(true, |s| item.status == s))
                .collect();

            print_table(&rows);
            if let Some(meta) = page.meta {
                println!(
                    "Halaman {}/{} ({} permohonan)",
                    meta.current_page, meta.last_page, meta.total
                );
            }
        }

        Command::Show { id } => {
            let item = console.permohonan.get(id).await?;
            print_detail(&item);
        }

        Command::Stats { per_page } => {
            let counts = console.permohonan.stats(per_page).await?;
            println!("{:<16} {:>5}", "Total", counts.total);
            for status in PermohonanStatus::ALL {
                println!("{:<16} {:>5}", status.label(), counts.count(status));
            }
            if counts.unknown > 0 {
                println!("{:<16} {:>5}", "Lainnya", counts.unknown);
            }
        }

        Command::Create {
            nomor_ijazah,
            jumlah_lembar,
            keperluan,
            file,
        } => {
            let mut fields = serde_json::json!({
                "nomor_ijazah": nomor_ijazah,
                "jumlah_lembar": jumlah_lembar,
                "keperluan": keperluan,
            });
            if let Some(file) = file {
                fields["file"] = serde_json::Value::String(file);
            }
            let item = console.permohonan.create(&fields).await?;
            println!("Permohonan #{} berhasil diajukan", item.id);
            print_detail(&item);
        }

        Command::Download {
            id,
            original,
            verified,
            output,
        } => {
            let kind = if original {
                DocumentKind::Original
            } else if verified {
                DocumentKind::Verified
            } else {
                DocumentKind::Current
            };
            let item = console.permohonan.get(id).await?;
            let bytes = console.permohonan.download_document(&item, kind).await?;
            let path = output.unwrap_or_else(|| PathBuf::from(item.document_file_name(kind)));
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Dokumen disimpan ke {} ({} bytes)", path.display(), bytes.len());
        }

        Command::Verify { id } => {
            let message = console.permohonan.verify(id).await?;
            println!("{}", message);
        }

        Command::Reject { id, reason } => {
            let message = console.permohonan.reject(id, &reason).await?;
            println!("{}", message);
        }

        Command::Export { output } => {
            let path = output.unwrap_or_else(default_export_path);
            let bytes = console.permohonan.export().await?;
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Export disimpan ke {} ({} bytes)", path.display(), bytes.len());
        }
    }

    Ok(())
}

fn default_export_path() -> PathBuf {
    PathBuf::from(format!(
        "permohonan-{}.xlsx",
        chrono::Local::now().format("%Y-%m-%d")
    ))
}

fn print_user(user: &UserProfile) {
    println!("{} <{}> (id {})", user.name, user.email, user.id);
}

fn print_table(rows: &[&Permohonan]) {
    if rows.is_empty() {
        println!("Tidak ada permohonan.");
        return;
    }

    println!(
        "{:>5}  {:<24} {:<18} {:>6}  {:<16} {}",
        "ID", "Pemohon", "No. Ijazah", "Lembar", "Status", "Diajukan"
    );
    for item in rows {
        let submitted = item
            .submitted_at()
            .map(|at| at.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>5}  {:<24} {:<18} {:>6}  {:<16} {}",
            item.id,
            truncate(item.applicant(), 24),
            truncate(&item.nomor_ijazah, 18),
            item.jumlah_lembar,
            truncate(item.status_label(), 16),
            submitted
        );
    }
}

fn print_detail(item: &Permohonan) {
    println!("Permohonan #{}", item.id);
    println!("  Pemohon      : {}", item.applicant());
    if let Some(user) = &item.user {
        println!("  Email        : {}", user.email);
    }
    println!("  No. Ijazah   : {}", item.nomor_ijazah);
    println!("  Jumlah lembar: {}", item.jumlah_lembar);
    println!("  Keperluan    : {}", item.keperluan);
    println!("  Status       : {} ({})", item.status_label(), item.status.code());
    println!("  Berkas       : {}", item.file);
    if let Some(verified) = item.document(DocumentKind::Verified) {
        println!("  Berkas legal : {}", verified);
    }
    if !item.can_review() {
        println!("  (sudah diproses, tidak dapat diverifikasi atau ditolak)");
    }
    if let Some(taken) = &item.tanggal_diambil {
        println!("  Diambil      : {}", taken);
    }
    if let Some(at) = item.submitted_at() {
        println!("  Diajukan     : {}", at.format("%Y-%m-%d %H:%M"));
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
