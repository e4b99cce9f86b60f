pub mod mock_lsp;
